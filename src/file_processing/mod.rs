pub mod comments;
pub mod response_parser;
pub mod scanner;
pub mod writer;
