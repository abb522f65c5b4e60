pub mod ask;
pub mod mailbox;
pub mod postprocess;
pub mod preprocess;
pub mod serve;
pub mod watch;
