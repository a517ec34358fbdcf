mod navigation_tests;
mod visit_tests;
