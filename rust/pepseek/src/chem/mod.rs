pub mod mass;

pub use mass::{
    MassTable,
    SearchKind,
    neutral_mass,
    scale_mass,
    unscale_mass,
};
