//! # CHEAQI Algorithms
//!
//! Spatial estimation for the CHEAQI interpolation pipeline.
//!
//! ## Modules
//!
//! - **interpolation**: query grid construction, variogram fitting,
//!   ordinary kriging, inverse distance weighting and radial basis functions
//!
//! Row work is spread over rayon when the `parallel` feature is enabled
//! (the default) and runs sequentially otherwise.

pub mod interpolation;
mod linalg;
mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::interpolation::{
        build_grid, interpolate, Grid, GridSpec, IdwParams, InterpolationMethod, KrigingParams,
        MethodKind, RbfFunction, RbfParams, Resolution, SamplePoint, Surface, VariogramModel,
    };
    pub use cheaqi_core::prelude::*;
}
