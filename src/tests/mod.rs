mod utils;
mod workflow_tests;
