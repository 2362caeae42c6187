//! Molecular graph produced by the SMILES parser.

use serde::{Deserialize, Serialize};

use crate::element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to the valence of either end. Aromatic bonds count as
    /// one; the aromatic atom's extra electron is accounted separately.
    pub fn valence(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }

    /// Numeric bond type used in fingerprint hashing.
    pub fn type_code(self) -> u32 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
            BondOrder::Aromatic => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub atomic_number: u8,
    pub aromatic: bool,
    pub charge: i8,
    pub isotope: Option<u16>,
    /// Total attached hydrogens, explicit and implicit.
    pub hydrogens: u8,
    /// Written in brackets (no implicit hydrogens are added).
    pub bracket: bool,
}

impl Atom {
    pub fn symbol(&self) -> &'static str {
        element::symbol(self.atomic_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub begin: usize,
    pub end: usize,
    pub order: BondOrder,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.begin == atom { self.end } else { self.begin }
    }
}

/// Heavy-atom graph with hydrogens folded into counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// atom -> [(neighbour, bond index)]
    adjacency: Vec<Vec<(usize, usize)>>,
    ring_bonds: Vec<bool>,
}

impl Molecule {
    pub(crate) fn from_parts(atoms: Vec<Atom>, bonds: Vec<Bond>) -> Self {
        let adjacency = build_adjacency(atoms.len(), &bonds);
        let ring_bonds = find_ring_bonds(atoms.len(), &bonds, &adjacency);
        Self { atoms, bonds, adjacency, ring_bonds }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn neighbors(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    /// Number of explicit (heavy-atom) connections.
    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    /// Heavy connections plus attached hydrogens.
    pub fn total_degree(&self, atom: usize) -> usize {
        self.degree(atom) + self.atoms[atom].hydrogens as usize
    }

    pub fn is_ring_bond(&self, bond: usize) -> bool {
        self.ring_bonds[bond]
    }

    pub fn is_ring_atom(&self, atom: usize) -> bool {
        self.adjacency[atom].iter().any(|&(_, b)| self.ring_bonds[b])
    }
}

fn build_adjacency(n_atoms: usize, bonds: &[Bond]) -> Vec<Vec<(usize, usize)>> {
    let mut adjacency = vec![Vec::new(); n_atoms];
    for (idx, bond) in bonds.iter().enumerate() {
        adjacency[bond.begin].push((bond.end, idx));
        adjacency[bond.end].push((bond.begin, idx));
    }
    adjacency
}

/// Ring membership per bond for a graph that is not yet a [`Molecule`].
pub(crate) fn ring_bond_flags(n_atoms: usize, bonds: &[Bond]) -> Vec<bool> {
    find_ring_bonds(n_atoms, bonds, &build_adjacency(n_atoms, bonds))
}

/// A bond lies on a ring iff it is not a bridge. Tarjan low-link over each
/// connected component.
fn find_ring_bonds(n_atoms: usize, bonds: &[Bond], adjacency: &[Vec<(usize, usize)>]) -> Vec<bool> {
    let mut ring = vec![true; bonds.len()];
    let mut order = vec![usize::MAX; n_atoms];
    let mut low = vec![0usize; n_atoms];
    let mut counter = 0usize;

    for root in 0..n_atoms {
        if order[root] != usize::MAX {
            continue;
        }
        // (atom, bond used to reach it, next adjacency slot)
        let mut stack: Vec<(usize, Option<usize>, usize)> = vec![(root, None, 0)];
        order[root] = counter;
        low[root] = counter;
        counter += 1;

        while let Some(frame) = stack.last_mut() {
            let (atom, via, slot) = *frame;
            if slot < adjacency[atom].len() {
                frame.2 += 1;
                let (next, bond) = adjacency[atom][slot];
                if Some(bond) == via {
                    continue;
                }
                if order[next] == usize::MAX {
                    order[next] = counter;
                    low[next] = counter;
                    counter += 1;
                    stack.push((next, Some(bond), 0));
                } else {
                    low[atom] = low[atom].min(order[next]);
                }
            } else {
                stack.pop();
                if let (Some(bond), Some(parent)) = (via, stack.last()) {
                    let parent = parent.0;
                    low[parent] = low[parent].min(low[atom]);
                    if low[atom] > order[parent] {
                        ring[bond] = false;
                    }
                }
            }
        }
    }
    debug_assert_eq!(ring.len(), bonds.len());
    ring
}
