//! Morgan (ECFP-style) circular fingerprints.
//!
//! Atom environments are grown one bond shell per iteration. Each new
//! environment is hashed from the atom's previous identifier and its sorted
//! (bond type, neighbour identifier) pairs, then folded into `n_bits` by
//! modulo. Environments covering a bond set already seen are dropped, and the
//! atom stops contributing from then on.

use serde::{Deserialize, Serialize};

use crate::element;
use crate::molecule::Molecule;

// ── Bit vector ────────────────────────────────────────────────────────────────

/// Fixed-length bit vector backed by 64-bit words.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitVector {
    words: Vec<u64>,
    len: usize,
}

impl BitVector {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, bit: usize) {
        assert!(bit < self.len, "bit {bit} out of range for {} bits", self.len);
        self.words[bit / 64] |= 1u64 << (bit % 64);
    }

    pub fn get(&self, bit: usize) -> bool {
        bit < self.len && self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.get(i))
    }
}

// ── Hashing ───────────────────────────────────────────────────────────────────

fn hash_combine(seed: &mut u32, value: u32) {
    *seed ^= value
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(*seed << 6)
        .wrapping_add(*seed >> 2);
}

fn hash_values(values: &[u32]) -> u32 {
    let mut seed = 0;
    for &v in values {
        hash_combine(&mut seed, v);
    }
    seed
}

/// Connectivity invariant: element, total degree, hydrogen count, charge,
/// isotope mass shift and ring membership.
fn atom_invariant(mol: &Molecule, atom: usize) -> u32 {
    let a = &mol.atoms()[atom];
    let delta_mass = match a.isotope {
        Some(iso) => (iso as f64 - element::atomic_weight(a.atomic_number)) as i32,
        None => 0,
    };
    let mut components = vec![
        a.atomic_number as u32,
        mol.total_degree(atom) as u32,
        a.hydrogens as u32,
        a.charge as i32 as u32,
        delta_mass as u32,
    ];
    if mol.is_ring_atom(atom) {
        components.push(1);
    }
    hash_values(&components)
}

// ── Fingerprint ───────────────────────────────────────────────────────────────

/// Folded Morgan fingerprint of the given radius.
pub fn morgan_fingerprint(mol: &Molecule, radius: u32, n_bits: usize) -> BitVector {
    let mut fp = BitVector::new(n_bits);
    if n_bits == 0 {
        return fp;
    }
    let n_atoms = mol.atom_count();
    let n_bonds = mol.bond_count();

    let mut current: Vec<u32> = (0..n_atoms).map(|a| atom_invariant(mol, a)).collect();
    for &inv in &current {
        fp.set(inv as usize % n_bits);
    }

    let mut environments: Vec<Vec<bool>> = vec![vec![false; n_bonds]; n_atoms];
    let mut seen: Vec<Vec<bool>> = Vec::new();
    let mut dead = vec![false; n_atoms];

    for layer in 0..radius {
        let mut next = current.clone();
        let mut next_env = environments.clone();
        let mut round: Vec<(Vec<bool>, u32, usize)> = Vec::with_capacity(n_atoms);

        for atom in 0..n_atoms {
            if dead[atom] {
                continue;
            }
            if mol.degree(atom) == 0 {
                dead[atom] = true;
                continue;
            }

            let mut pairs: Vec<(u32, u32)> = Vec::with_capacity(mol.degree(atom));
            for &(nbr, bond) in mol.neighbors(atom) {
                for (slot, covered) in next_env[atom].iter_mut().zip(&environments[nbr]) {
                    *slot |= *covered;
                }
                next_env[atom][bond] = true;
                pairs.push((mol.bonds()[bond].order.type_code(), current[nbr]));
            }
            pairs.sort_unstable();

            let mut invariant = layer;
            hash_combine(&mut invariant, current[atom]);
            for (bond_type, nbr_inv) in pairs {
                hash_combine(&mut invariant, hash_values(&[bond_type, nbr_inv]));
            }
            next[atom] = invariant;
            round.push((next_env[atom].clone(), invariant, atom));
        }

        round.sort();
        for (env, invariant, atom) in round {
            if seen.contains(&env) {
                dead[atom] = true;
            } else {
                fp.set(invariant as usize % n_bits);
                seen.push(env);
            }
        }

        current = next;
        environments = next_env;
    }
    fp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn fp(smiles: &str) -> BitVector {
        morgan_fingerprint(&parse_smiles(smiles).unwrap(), 2, 1024)
    }

    #[test]
    fn test_bit_vector_basics() {
        let mut bits = BitVector::new(130);
        bits.set(0);
        bits.set(64);
        bits.set(129);
        assert_eq!(bits.count_ones(), 3);
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![0, 64, 129]);
        assert!(!bits.get(1));
        assert!(!bits.get(500));
        assert!(bits.get(129));
        assert_eq!(bits.len(), 130);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(fp("CC(=O)Oc1ccccc1C(=O)O"), fp("CC(=O)Oc1ccccc1C(=O)O"));
    }

    #[test]
    fn test_equivalent_smiles_give_same_bits() {
        assert_eq!(fp("OCC"), fp("CCO"));
        assert_eq!(fp("c1ccccc1O"), fp("Oc1ccccc1"));
    }

    #[test]
    fn test_different_molecules_differ() {
        let a = fp("CCO");
        let b = fp("c1ccncc1");
        assert_ne!(a, b);
        let shared = a.iter_ones().filter(|&i| b.get(i)).count();
        let union = a.count_ones() + b.count_ones() - shared;
        assert!(shared * 2 < union);
    }

    #[test]
    fn test_single_atom_sets_one_bit() {
        let bits = fp("C");
        assert_eq!(bits.count_ones(), 1);
    }

    #[test]
    fn test_radius_zero_is_atom_types_only() {
        let mol = parse_smiles("CCCC").unwrap();
        // Two distinct atom environments: terminal CH3 and internal CH2.
        assert_eq!(morgan_fingerprint(&mol, 0, 2048).count_ones(), 2);
        assert!(morgan_fingerprint(&mol, 2, 2048).count_ones() > 2);
    }

    #[test]
    fn test_benzene_environments_collapse() {
        // All six atoms are equivalent: one bit per radius at most.
        let bits = morgan_fingerprint(&parse_smiles("c1ccccc1").unwrap(), 2, 2048);
        assert!(bits.count_ones() <= 3);
        assert!(bits.count_ones() >= 1);
    }

    #[test]
    fn test_vector_length_follows_n_bits() {
        let mol = parse_smiles("CCN").unwrap();
        assert_eq!(morgan_fingerprint(&mol, 2, 512).len(), 512);
        assert!(morgan_fingerprint(&mol, 2, 512).iter_ones().all(|b| b < 512));
    }
}
