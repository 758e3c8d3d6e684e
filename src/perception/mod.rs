pub mod geometry;
pub mod matcher;
pub mod ocr;
pub mod screenshot;
pub mod traits;
pub mod types;
pub mod wait_image;
