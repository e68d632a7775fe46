// Main integration test file that includes all test modules

mod integration {
    pub mod generation_tests;
    pub mod pipeline_tests;
}

mod helpers {
    pub mod mock_analyzer;
    pub mod test_utils;
}
