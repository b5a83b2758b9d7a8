mod ik;
mod pose;
mod rig;
mod session;

pub use ik::*;
pub use pose::*;
pub use rig::*;
pub use session::*;


#[cfg(test)]
mod ik_tests;
