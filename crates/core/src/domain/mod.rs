pub mod call;
pub mod knowledge;
pub mod lead;
pub mod task;
