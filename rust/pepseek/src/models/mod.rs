pub mod cleave;
pub mod mods;

pub use cleave::{
    CleavageRule,
    Enzyme,
    PeptideBounds,
};
pub use mods::{
    builtin_mods,
    collect_sites,
    resolve_mods,
    ModCombination,
    ModEnumerator,
    ModSite,
    ModificationDef,
};
