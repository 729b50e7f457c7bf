pub mod analysis;
pub mod effects;
pub mod io;
pub mod loudness;
