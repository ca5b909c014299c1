pub mod composite;
pub mod normalize;
pub mod trend;
pub mod weights;
