pub mod health;
pub mod matches;
pub mod personality;
pub mod vectors;
