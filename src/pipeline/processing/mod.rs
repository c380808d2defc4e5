// Pipeline processing: source parsing, metric derivation, canonicalization and validation

pub mod derive;
pub mod normalize;
pub mod parser;
pub mod quality_gate;
