// Domain layer: core models, the upload session and ports (interfaces).

pub mod model;
pub mod ports;
pub mod session;
