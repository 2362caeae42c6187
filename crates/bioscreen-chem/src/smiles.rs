//! SMILES parser.
//!
//! Covers the OpenSMILES subset found in screening libraries: organic-subset
//! and bracket atoms, bond symbols, branches, ring closures (`1`, `%12`) and
//! dot-disconnected components. Stereo markers are accepted and ignored.
//!
//! After reading the string the parser:
//!   1. turns unwritten bonds between aromatic atoms of different rings
//!      (biaryl links such as `c1ccccc1c1ccccc1`) into single bonds,
//!   2. folds explicit `[H]` atoms into their heavy neighbour,
//!   3. assigns implicit hydrogens from the default valences,
//!   4. rejects aromatic atoms outside rings, explicit `:` bonds outside
//!      rings and aromatic systems that cannot be kekulized.
//!
//! Anything rejected here is what the fingerprint stage reports as an
//! unparseable structure.

use std::collections::HashMap;

use thiserror::Error;

use crate::element;
use crate::molecule::{ring_bond_flags, Atom, Bond, BondOrder, Molecule};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmilesError {
    #[error("empty SMILES")]
    Empty,
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unknown element '{symbol}' at position {pos}")]
    UnknownElement { symbol: String, pos: usize },
    #[error("unterminated bracket atom starting at position {0}")]
    UnterminatedBracket(usize),
    #[error("bond at position {0} has no preceding atom")]
    DanglingBond(usize),
    #[error("branch at position {0} has no preceding atom")]
    BranchWithoutAtom(usize),
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("ring closure {0} is never closed")]
    UnclosedRing(u32),
    #[error("ring closure {0} bonds an atom to itself")]
    SelfBond(u32),
    #[error("ring closure {0} has conflicting bond orders")]
    ConflictingRingBond(u32),
    #[error("duplicate bond between atoms {0} and {1}")]
    DuplicateBond(usize, usize),
    #[error("element '{0}' cannot be aromatic")]
    InvalidAromatic(String),
    #[error("aromatic atom {0} is not in a ring")]
    NonRingAromatic(usize),
    #[error("explicit valence exceeded on {symbol} atom {atom}")]
    Valence { symbol: String, atom: usize },
    #[error("cannot kekulize aromatic system")]
    Kekulize,
}

/// Parse a SMILES string into a hydrogen-suppressed [`Molecule`].
pub fn parse_smiles(smiles: &str) -> Result<Molecule, SmilesError> {
    let smiles = smiles.trim();
    if smiles.is_empty() {
        return Err(SmilesError::Empty);
    }
    let mut raw = Parser::new(smiles).run()?;
    raw.demote_chain_aromatic_bonds();
    let (atoms, bonds) = fold_hydrogens(raw.atoms, raw.bonds);
    let mut atoms = atoms;
    assign_implicit_hydrogens(&mut atoms, &bonds)?;
    let mol = Molecule::from_parts(atoms, bonds);
    check_aromaticity(&mol)?;
    Ok(mol)
}

// ── Tokenizer / graph builder ────────────────────────────────────────────────

struct RawGraph {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// Bonds that are aromatic only because both ends are lowercase atoms.
    implicit_aromatic: Vec<bool>,
}

impl RawGraph {
    fn demote_chain_aromatic_bonds(&mut self) {
        let ring = ring_bond_flags(self.atoms.len(), &self.bonds);
        for (idx, bond) in self.bonds.iter_mut().enumerate() {
            if self.implicit_aromatic[idx] && !ring[idx] {
                bond.order = BondOrder::Single;
            }
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    implicit_aromatic: Vec<bool>,
    prev: Option<usize>,
    pending: Option<(BondOrder, usize)>,
    branches: Vec<Option<usize>>,
    rings: HashMap<u32, (usize, Option<BondOrder>)>,
}

impl<'a> Parser<'a> {
    fn new(smiles: &'a str) -> Self {
        Self {
            bytes: smiles.as_bytes(),
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
            implicit_aromatic: Vec::new(),
            prev: None,
            pending: None,
            branches: Vec::new(),
            rings: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn unexpected(&self) -> SmilesError {
        let ch = std::str::from_utf8(&self.bytes[self.pos..])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or('?');
        SmilesError::UnexpectedChar { ch, pos: self.pos }
    }

    fn run(mut self) -> Result<RawGraph, SmilesError> {
        while let Some(c) = self.peek() {
            match c {
                b'(' => {
                    if self.prev.is_none() || self.pending.is_some() {
                        return Err(SmilesError::BranchWithoutAtom(self.pos));
                    }
                    self.branches.push(self.prev);
                    self.pos += 1;
                }
                b')' => {
                    if let Some((_, at)) = self.pending {
                        return Err(SmilesError::DanglingBond(at));
                    }
                    self.prev = self.branches.pop().ok_or(SmilesError::UnbalancedParentheses)?;
                    self.pos += 1;
                }
                b'-' | b'=' | b'#' | b'$' | b':' | b'/' | b'\\' => {
                    if self.prev.is_none() || self.pending.is_some() {
                        return Err(SmilesError::DanglingBond(self.pos));
                    }
                    let order = match c {
                        b'=' => BondOrder::Double,
                        b'#' => BondOrder::Triple,
                        b'$' => BondOrder::Quadruple,
                        b':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    };
                    self.pending = Some((order, self.pos));
                    self.pos += 1;
                }
                b'.' => {
                    if self.pending.is_some() || self.prev.is_none() {
                        return Err(SmilesError::DanglingBond(self.pos));
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                b'0'..=b'9' | b'%' => self.ring_closure()?,
                b'[' => {
                    let atom = self.bracket_atom()?;
                    self.push_atom(atom)?;
                }
                _ => {
                    let atom = self.organic_atom()?;
                    self.push_atom(atom)?;
                }
            }
        }

        if let Some((_, at)) = self.pending {
            return Err(SmilesError::DanglingBond(at));
        }
        if !self.branches.is_empty() {
            return Err(SmilesError::UnbalancedParentheses);
        }
        if let Some(&ring) = self.rings.keys().min() {
            return Err(SmilesError::UnclosedRing(ring));
        }
        Ok(RawGraph {
            atoms: self.atoms,
            bonds: self.bonds,
            implicit_aromatic: self.implicit_aromatic,
        })
    }

    fn push_atom(&mut self, atom: Atom) -> Result<(), SmilesError> {
        let idx = self.atoms.len();
        self.atoms.push(atom);
        if let Some(prev) = self.prev {
            let order = self.pending.take().map(|(o, _)| o);
            self.add_bond(prev, idx, order)?;
        }
        self.prev = Some(idx);
        Ok(())
    }

    fn implicit_order(&self, a: usize, b: usize) -> BondOrder {
        if self.atoms[a].aromatic && self.atoms[b].aromatic {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn add_bond(&mut self, a: usize, b: usize, order: Option<BondOrder>) -> Result<(), SmilesError> {
        let exists = self
            .bonds
            .iter()
            .any(|bd| (bd.begin == a && bd.end == b) || (bd.begin == b && bd.end == a));
        if exists {
            return Err(SmilesError::DuplicateBond(a.min(b), a.max(b)));
        }
        let implicit = order.is_none();
        let order = order.unwrap_or_else(|| self.implicit_order(a, b));
        self.implicit_aromatic.push(implicit && order == BondOrder::Aromatic);
        self.bonds.push(Bond { begin: a, end: b, order });
        Ok(())
    }

    fn ring_closure(&mut self) -> Result<(), SmilesError> {
        let start = self.pos;
        let number = if self.peek() == Some(b'%') {
            let (d1, d2) = (self.peek_at(1), self.peek_at(2));
            match (d1, d2) {
                (Some(a @ b'0'..=b'9'), Some(b @ b'0'..=b'9')) => {
                    self.pos += 3;
                    ((a - b'0') as u32) * 10 + (b - b'0') as u32
                }
                _ => return Err(self.unexpected()),
            }
        } else {
            let d = self.peek().unwrap_or(b'0');
            self.pos += 1;
            (d - b'0') as u32
        };

        let current = self.prev.ok_or(SmilesError::DanglingBond(start))?;
        let order = self.pending.take().map(|(o, _)| o);

        match self.rings.remove(&number) {
            Some((opener, open_order)) => {
                if opener == current {
                    return Err(SmilesError::SelfBond(number));
                }
                let order = match (open_order, order) {
                    (Some(a), Some(b)) if a != b => return Err(SmilesError::ConflictingRingBond(number)),
                    (a, b) => a.or(b),
                };
                self.add_bond(opener, current, order)?;
            }
            None => {
                self.rings.insert(number, (current, order));
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<Atom, SmilesError> {
        let start = self.pos;
        let c = self.peek().ok_or_else(|| self.unexpected())?;
        let next = self.peek_at(1);

        let (symbol, aromatic, len): (&str, bool, usize) = match (c, next) {
            (b'C', Some(b'l')) => ("Cl", false, 2),
            (b'B', Some(b'r')) => ("Br", false, 2),
            (b'B', _) => ("B", false, 1),
            (b'C', _) => ("C", false, 1),
            (b'N', _) => ("N", false, 1),
            (b'O', _) => ("O", false, 1),
            (b'P', _) => ("P", false, 1),
            (b'S', _) => ("S", false, 1),
            (b'F', _) => ("F", false, 1),
            (b'I', _) => ("I", false, 1),
            (b'*', _) => ("*", false, 1),
            (b'b', _) => ("B", true, 1),
            (b'c', _) => ("C", true, 1),
            (b'n', _) => ("N", true, 1),
            (b'o', _) => ("O", true, 1),
            (b'p', _) => ("P", true, 1),
            (b's', _) => ("S", true, 1),
            (c, _) if c.is_ascii_alphabetic() => {
                let end = if next.map_or(false, |n| n.is_ascii_lowercase()) { 2 } else { 1 };
                let symbol = String::from_utf8_lossy(&self.bytes[start..start + end]).into_owned();
                return Err(SmilesError::UnknownElement { symbol, pos: start });
            }
            _ => return Err(self.unexpected()),
        };
        self.pos += len;

        let atomic_number = element::atomic_number(symbol).ok_or_else(|| SmilesError::UnknownElement {
            symbol: symbol.to_string(),
            pos: start,
        })?;
        Ok(Atom {
            atomic_number,
            aromatic,
            charge: 0,
            isotope: None,
            hydrogens: 0,
            bracket: false,
        })
    }

    fn read_number(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos]).ok()?.parse().ok()
    }

    fn bracket_atom(&mut self) -> Result<Atom, SmilesError> {
        let open = self.pos;
        self.pos += 1;

        let isotope = self.read_number().map(|n| n.min(u16::MAX as u32) as u16);

        // Element symbol: aromatic lowercase forms first, then one or two letters.
        let sym_start = self.pos;
        let (atomic_number, aromatic) = match self.peek() {
            Some(b'*') => {
                self.pos += 1;
                (0, false)
            }
            Some(c) if c.is_ascii_lowercase() => {
                let two = self.peek_at(1).filter(|n| n.is_ascii_lowercase());
                let (symbol, len) = match (c, two) {
                    (b's', Some(b'e')) => ("Se", 2),
                    (b'a', Some(b's')) => ("As", 2),
                    (b't', Some(b'e')) => ("Te", 2),
                    (b'b', _) => ("B", 1),
                    (b'c', _) => ("C", 1),
                    (b'n', _) => ("N", 1),
                    (b'o', _) => ("O", 1),
                    (b'p', _) => ("P", 1),
                    (b's', _) => ("S", 1),
                    _ => {
                        return Err(SmilesError::UnknownElement {
                            symbol: (c as char).to_string(),
                            pos: sym_start,
                        })
                    }
                };
                self.pos += len;
                let n = element::atomic_number(symbol).ok_or(SmilesError::UnknownElement {
                    symbol: symbol.to_string(),
                    pos: sym_start,
                })?;
                (n, true)
            }
            Some(c) if c.is_ascii_uppercase() => {
                let two = self
                    .peek_at(1)
                    .filter(|n| n.is_ascii_lowercase())
                    .map(|n| format!("{}{}", c as char, n as char))
                    .and_then(|s| element::atomic_number(&s));
                match two {
                    Some(n) => {
                        self.pos += 2;
                        (n, false)
                    }
                    None => {
                        let symbol = (c as char).to_string();
                        let n = element::atomic_number(&symbol)
                            .ok_or(SmilesError::UnknownElement { symbol, pos: sym_start })?;
                        self.pos += 1;
                        (n, false)
                    }
                }
            }
            None => return Err(SmilesError::UnterminatedBracket(open)),
            _ => return Err(self.unexpected()),
        };

        // Chirality: @, @@, @TH1, @SP2, @OH12 ...
        if self.peek() == Some(b'@') {
            self.pos += 1;
            if self.peek() == Some(b'@') {
                self.pos += 1;
            } else {
                let class = (self.peek(), self.peek_at(1), self.peek_at(2));
                if let (Some(a), Some(b), Some(b'0'..=b'9')) = class {
                    if matches!(&[a, b], b"TH" | b"AL" | b"SP" | b"TB" | b"OH") {
                        self.pos += 2;
                        self.read_number();
                    }
                }
            }
        }

        let mut hydrogens = 0u8;
        if self.peek() == Some(b'H') {
            self.pos += 1;
            hydrogens = self.read_number().map(|n| n.min(9) as u8).unwrap_or(1);
        }

        let mut charge: i32 = 0;
        if let Some(sign @ (b'+' | b'-')) = self.peek() {
            let unit = if sign == b'+' { 1 } else { -1 };
            self.pos += 1;
            if let Some(n) = self.read_number() {
                charge = unit * n as i32;
            } else {
                charge = unit;
                while self.peek() == Some(sign) {
                    self.pos += 1;
                    charge += unit;
                }
            }
        }

        if self.peek() == Some(b':') {
            self.pos += 1;
            self.read_number().ok_or_else(|| self.unexpected())?;
        }

        match self.peek() {
            Some(b']') => self.pos += 1,
            None => return Err(SmilesError::UnterminatedBracket(open)),
            _ => return Err(self.unexpected()),
        }

        if aromatic && !element::can_be_aromatic(atomic_number) {
            return Err(SmilesError::InvalidAromatic(element::symbol(atomic_number).to_string()));
        }

        Ok(Atom {
            atomic_number,
            aromatic,
            charge: charge.clamp(i8::MIN as i32, i8::MAX as i32) as i8,
            isotope,
            hydrogens,
            bracket: true,
        })
    }
}

// ── Post-processing ──────────────────────────────────────────────────────────

/// Removes plain hydrogen atoms singly bonded to a heavy atom and adds them
/// to that atom's hydrogen count. Isotopic, charged or bridging hydrogens
/// and H2 stay explicit.
fn fold_hydrogens(atoms: Vec<Atom>, bonds: Vec<Bond>) -> (Vec<Atom>, Vec<Bond>) {
    let mut degree = vec![0usize; atoms.len()];
    for bond in &bonds {
        degree[bond.begin] += 1;
        degree[bond.end] += 1;
    }

    let mut removable = vec![false; atoms.len()];
    let mut extra_h = vec![0u8; atoms.len()];
    for bond in &bonds {
        if bond.order != BondOrder::Single {
            continue;
        }
        for (h, heavy) in [(bond.begin, bond.end), (bond.end, bond.begin)] {
            let atom = &atoms[h];
            let plain_h = atom.atomic_number == 1
                && atom.isotope.is_none()
                && atom.charge == 0
                && atom.hydrogens == 0
                && degree[h] == 1;
            if plain_h && atoms[heavy].atomic_number != 1 {
                removable[h] = true;
                extra_h[heavy] = extra_h[heavy].saturating_add(1);
            }
        }
    }

    if !removable.iter().any(|&r| r) {
        return (atoms, bonds);
    }

    let mut remap = vec![usize::MAX; atoms.len()];
    let mut kept = Vec::with_capacity(atoms.len());
    for (idx, mut atom) in atoms.into_iter().enumerate() {
        if removable[idx] {
            continue;
        }
        atom.hydrogens = atom.hydrogens.saturating_add(extra_h[idx]);
        remap[idx] = kept.len();
        kept.push(atom);
    }
    let bonds = bonds
        .into_iter()
        .filter(|b| !removable[b.begin] && !removable[b.end])
        .map(|b| Bond { begin: remap[b.begin], end: remap[b.end], order: b.order })
        .collect();
    (kept, bonds)
}

fn bond_valence_sum(atom: usize, bonds: &[Bond]) -> u32 {
    bonds
        .iter()
        .filter(|b| b.begin == atom || b.end == atom)
        .map(|b| b.order.valence() as u32)
        .sum()
}

fn assign_implicit_hydrogens(atoms: &mut [Atom], bonds: &[Bond]) -> Result<(), SmilesError> {
    for idx in 0..atoms.len() {
        let atom = &atoms[idx];
        if atom.bracket {
            continue;
        }
        let valences = element::default_valences(atom.atomic_number);
        if valences.is_empty() {
            continue;
        }
        let explicit = bond_valence_sum(idx, bonds) + atom.hydrogens as u32;

        let implicit = if atom.aromatic {
            // One valence goes to the aromatic system; fused or substituted
            // aromatic atoms simply end up with no hydrogens.
            (valences[0] as i64 - explicit as i64 - 1).max(0) as u8
        } else {
            match valences.iter().find(|&&v| v as u32 >= explicit) {
                Some(&v) => (v as u32 - explicit) as u8,
                None => {
                    return Err(SmilesError::Valence {
                        symbol: atom.symbol().to_string(),
                        atom: idx,
                    })
                }
            }
        };
        atoms[idx].hydrogens += implicit;
    }
    Ok(())
}

fn check_aromaticity(mol: &Molecule) -> Result<(), SmilesError> {
    for (idx, atom) in mol.atoms().iter().enumerate() {
        if atom.aromatic && !mol.is_ring_atom(idx) {
            return Err(SmilesError::NonRingAromatic(idx));
        }
    }
    for (idx, bond) in mol.bonds().iter().enumerate() {
        if bond.order == BondOrder::Aromatic && !mol.is_ring_bond(idx) {
            return Err(SmilesError::NonRingAromatic(bond.begin));
        }
    }

    // Aromatic atoms that still need a double bond must pair up along
    // aromatic bonds.
    let needs: Vec<bool> = (0..mol.atom_count())
        .map(|idx| needs_double_bond(mol, idx))
        .collect();
    let candidates: Vec<usize> = (0..mol.atom_count()).filter(|&i| needs[i]).collect();
    if candidates.is_empty() {
        return Ok(());
    }
    let mut mate = vec![usize::MAX; mol.atom_count()];
    let mut budget = 200_000usize;
    if match_all(mol, &needs, &candidates, 0, &mut mate, &mut budget) || budget == 0 {
        Ok(())
    } else {
        Err(SmilesError::Kekulize)
    }
}

fn needs_double_bond(mol: &Molecule, idx: usize) -> bool {
    let atom = &mol.atoms()[idx];
    if !atom.aromatic || atom.atomic_number == 0 {
        return false;
    }
    let valences = element::default_valences(atom.atomic_number);
    let base = match valences.first() {
        Some(&v) => v,
        None => return false,
    };
    let capacity = element::charged_valence(atom.atomic_number, base, atom.charge);
    let used: i32 = mol
        .neighbors(idx)
        .iter()
        .map(|&(_, b)| mol.bonds()[b].order.valence() as i32)
        .sum::<i32>()
        + atom.hydrogens as i32;
    capacity - used >= 1
}

fn match_all(
    mol: &Molecule,
    needs: &[bool],
    candidates: &[usize],
    from: usize,
    mate: &mut [usize],
    budget: &mut usize,
) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;
    let next = candidates[from..].iter().position(|&a| mate[a] == usize::MAX);
    let atom = match next {
        Some(offset) => candidates[from + offset],
        None => return true,
    };
    for &(nbr, bond) in mol.neighbors(atom) {
        if !needs[nbr] || mate[nbr] != usize::MAX || mol.bonds()[bond].order != BondOrder::Aromatic {
            continue;
        }
        mate[atom] = nbr;
        mate[nbr] = atom;
        if match_all(mol, needs, candidates, from, mate, budget) {
            return true;
        }
        mate[atom] = usize::MAX;
        mate[nbr] = usize::MAX;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hs(smiles: &str) -> Vec<u8> {
        parse_smiles(smiles).unwrap().atoms().iter().map(|a| a.hydrogens).collect()
    }

    #[test]
    fn test_implicit_hydrogens_aliphatic() {
        assert_eq!(hs("CCO"), vec![3, 2, 1]);
        assert_eq!(hs("C=O"), vec![2, 0]);
        assert_eq!(hs("C#N"), vec![1, 0]);
        assert_eq!(hs("CS(=O)(=O)C"), vec![3, 0, 0, 0, 3]);
    }

    #[test]
    fn test_implicit_hydrogens_aromatic() {
        assert_eq!(hs("c1ccccc1"), vec![1; 6]);
        assert_eq!(hs("c1ccncc1"), vec![1, 1, 1, 0, 1, 1]);
        assert_eq!(hs("c1cc[nH]c1"), vec![1, 1, 1, 1, 1]);
        // Ring-fusion carbons carry no hydrogen.
        let naph = hs("c1ccc2ccccc2c1");
        assert_eq!(naph.iter().filter(|&&h| h == 0).count(), 2);
    }

    #[test]
    fn test_bracket_atoms() {
        let mol = parse_smiles("[NH4+]").unwrap();
        assert_eq!(mol.atoms()[0].charge, 1);
        assert_eq!(mol.atoms()[0].hydrogens, 4);

        let mol = parse_smiles("[13CH3]C([O-])=O").unwrap();
        assert_eq!(mol.atoms()[0].isotope, Some(13));
        assert_eq!(mol.atoms()[2].charge, -1);

        let mol = parse_smiles("C[C@@H](N)C(=O)O").unwrap();
        assert_eq!(mol.atoms()[1].hydrogens, 1);

        let mol = parse_smiles("[Fe++]").unwrap();
        assert_eq!(mol.atoms()[0].charge, 2);
    }

    #[test]
    fn test_explicit_hydrogens_fold() {
        let mol = parse_smiles("[H]C([H])([H])O").unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.atoms()[0].hydrogens, 3);
        assert_eq!(mol.atoms()[1].hydrogens, 1);

        // Molecular hydrogen stays as two atoms.
        assert_eq!(parse_smiles("[H][H]").unwrap().atom_count(), 2);
    }

    #[test]
    fn test_ring_closures_and_branches() {
        let mol = parse_smiles("C1CC(C)CC1").unwrap();
        assert_eq!(mol.atom_count(), 6);
        assert_eq!(mol.bond_count(), 6);

        let mol = parse_smiles("C%10CCCCC%10").unwrap();
        assert_eq!(mol.bond_count(), 6);

        let mol = parse_smiles("C1=CC=CC=C1").unwrap();
        let doubles = mol.bonds().iter().filter(|b| b.order == BondOrder::Double).count();
        assert_eq!(doubles, 3);
    }

    #[test]
    fn test_disconnected_components() {
        let mol = parse_smiles("[Na+].[Cl-]").unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.bond_count(), 0);
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse_smiles(""), Err(SmilesError::Empty));
        assert_eq!(parse_smiles("   "), Err(SmilesError::Empty));
        assert!(matches!(parse_smiles("C1CC"), Err(SmilesError::UnclosedRing(1))));
        assert!(matches!(parse_smiles("C(C"), Err(SmilesError::UnbalancedParentheses)));
        assert!(matches!(parse_smiles("CC)"), Err(SmilesError::UnbalancedParentheses)));
        assert!(matches!(parse_smiles("=CC"), Err(SmilesError::DanglingBond(0))));
        assert!(matches!(parse_smiles("CC="), Err(SmilesError::DanglingBond(_))));
        assert!(matches!(parse_smiles("C[Xx]"), Err(SmilesError::UnknownElement { .. })));
        assert!(matches!(parse_smiles("CQ"), Err(SmilesError::UnknownElement { .. })));
        assert!(matches!(parse_smiles("C[C"), Err(SmilesError::UnterminatedBracket(1))));
        assert!(matches!(parse_smiles("C11"), Err(SmilesError::SelfBond(1))));
        assert!(matches!(parse_smiles("C12CC12"), Err(SmilesError::DuplicateBond(..))));
        assert!(matches!(parse_smiles("not a smiles"), Err(_)));
    }

    #[test]
    fn test_rejects_chemically_invalid() {
        assert!(matches!(parse_smiles("C(C)(C)(C)(C)C"), Err(SmilesError::Valence { .. })));
        assert!(matches!(parse_smiles("cc"), Err(SmilesError::NonRingAromatic(_))));
        assert_eq!(parse_smiles("c1cccc1"), Err(SmilesError::Kekulize));
        assert_eq!(parse_smiles("c1ccnc1"), Err(SmilesError::Kekulize));
    }

    #[test]
    fn test_drug_like_inputs_parse() {
        for smi in [
            "CC(=O)OC1=CC=CC=C1C(=O)O",
            "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",
            "CC(C)Cc1ccc(cc1)C(C)C(=O)O",
            "O=C(O)c1ccccc1O",
            "c1ccc2[nH]ccc2c1",
            "O=[N+]([O-])c1ccccc1",
            "Clc1ccc(Cl)cc1",
            "OC[C@H]1OC(O)[C@H](O)[C@@H](O)[C@@H]1O",
            "CCN(CC)CCNC(=O)c1ccc(N)cc1",
            "c1ccc2c(c1)oc1ccccc12",
            "Cn1cnc2c1c(=O)n(C)c(=O)n2C",
            "c1ccccc1c1ccccc1",
            "c1ccc(cc1)c1ccccc1",
            "Cc1ccc(cc1)c1ccncc1",
            "c1ccc(nc1)c1ccccn1",
        ] {
            assert!(parse_smiles(smi).is_ok(), "failed to parse {smi}: {:?}", parse_smiles(smi));
        }
    }

    #[test]
    fn test_biaryl_link_is_single() {
        let mol = parse_smiles("c1ccccc1c1ccccc1").unwrap();
        let link = mol
            .bonds()
            .iter()
            .position(|b| (b.begin, b.end) == (5, 6))
            .unwrap();
        assert_eq!(mol.bonds()[link].order, BondOrder::Single);
        assert!(!mol.is_ring_bond(link));
        assert!(mol
            .bonds()
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx != link)
            .all(|(_, b)| b.order == BondOrder::Aromatic));
    }

    #[test]
    fn test_explicit_aromatic_bond_outside_ring_is_rejected() {
        assert!(matches!(
            parse_smiles("c1ccccc1:c1ccccc1"),
            Err(SmilesError::NonRingAromatic(_))
        ));
    }
}
