pub mod git;
pub mod rig;
