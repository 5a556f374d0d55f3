pub mod boundary;
pub mod deforestation;
pub mod grid;
pub mod vegetation;
