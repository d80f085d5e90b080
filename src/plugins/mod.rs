pub mod controls;
pub mod persistence;
pub mod pointer_gesture;
pub mod stats_boards;
