pub mod fib;
pub mod interest;
pub mod publish;
pub mod run;
pub mod stats;
