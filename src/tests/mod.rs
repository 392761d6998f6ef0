
mod time_tests;

// Collaborators and outer layers
mod batch_tests;
mod config_tests;
mod reader_tests;
mod reference_tests;
