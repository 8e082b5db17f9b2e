pub mod broadcasts;
pub mod credits;
pub mod generations;
