pub mod mock_analyzer;
pub mod test_utils;
