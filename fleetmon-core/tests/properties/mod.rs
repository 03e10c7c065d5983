mod backoff_tests;
mod cache_tests;
mod parse_tests;
