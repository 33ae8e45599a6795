pub mod corridor_test_environment;
