pub mod logging;
pub mod pool;
pub mod profiling;
