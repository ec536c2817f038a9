// Domain layer - Clip specification, validation and media types

pub mod errors;
pub mod model;
pub mod rules;
