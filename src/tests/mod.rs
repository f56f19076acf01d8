mod api_tests;
pub mod test_utils;
