pub mod prober;
pub mod runner;

pub use prober::ReqwestProber;
pub use runner::HttpSyncRunner;
