// Database integration tests module
pub mod accounts_test;
pub mod logs_test;
