// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod constraint;
pub mod graphics;
pub mod metalocation;
pub mod traverse;
pub mod world;
