pub mod path_logger;
