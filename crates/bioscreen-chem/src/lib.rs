//! Bioscreen chemistry: SMILES parsing, molecular graphs and Morgan
//! fingerprints.

pub mod element;
pub mod fingerprint;
pub mod molecule;
pub mod morgan;
pub mod smiles;

pub use fingerprint::{FingerprintComputer, FingerprintRow, FingerprintTable, FingerprintVector};
pub use molecule::{Atom, Bond, BondOrder, Molecule};
pub use morgan::{morgan_fingerprint, BitVector};
pub use smiles::{parse_smiles, SmilesError};
