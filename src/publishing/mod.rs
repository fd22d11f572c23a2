pub mod brand_diet;
pub mod media;
pub mod workflow;
