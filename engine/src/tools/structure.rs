//! Structure summary for PDB text
//!
//! Reads fixed-column `ATOM`/`HETATM` records of the first model and reports
//! per-chain residue ranges, contiguous segments (ready to paste into a
//! contig spec) and a short one-letter sequence preview.

use serde::Serialize;

/// Residues shown in a sequence preview before it is cut
const PREVIEW_RESIDUES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSummary {
    pub chain_id: String,
    pub num_residues: usize,
    pub residue_start: Option<i64>,
    pub residue_end: Option<i64>,
    pub segments: Vec<String>,
    pub sequence_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureSummary {
    pub num_chains: usize,
    pub chains: Vec<ChainSummary>,
    pub total_residues: usize,
    pub total_atoms: usize,
}

impl StructureSummary {
    /// Human-readable overview used in tool results
    pub fn describe(&self, name: &str) -> String {
        let mut lines = vec![
            format!("Structure {}:", name),
            format!("  Chains: {}", self.num_chains),
            format!("  Residues: {}", self.total_residues),
            format!("  Atoms: {}", self.total_atoms),
        ];
        for chain in &self.chains {
            let range = match (chain.residue_start, chain.residue_end) {
                (Some(start), Some(end)) => format!("{}-{}", start, end),
                _ => "?".to_string(),
            };
            lines.push(format!(
                "  Chain {}: {} residues ({})",
                chain.chain_id, chain.num_residues, range
            ));
        }
        lines.join("\n")
    }
}

#[derive(Default)]
struct ChainBuilder {
    chain_id: String,
    atoms: usize,
    // (residue number, insertion code, residue name) for polymer residues
    residues: Vec<(i64, char, String)>,
}

impl ChainBuilder {
    fn finish(self) -> ChainSummary {
        let numbers: Vec<i64> = self.residues.iter().map(|(n, _, _)| *n).collect();

        let mut segments = Vec::new();
        if let Some(&first) = numbers.first() {
            let mut seg_start = first;
            let mut prev = first;
            for &n in &numbers[1..] {
                if n - prev > 1 {
                    segments.push(format!("{}{}-{}", self.chain_id, seg_start, prev));
                    seg_start = n;
                }
                prev = n;
            }
            segments.push(format!("{}{}-{}", self.chain_id, seg_start, prev));
        }

        let mut sequence_preview: String = self
            .residues
            .iter()
            .take(PREVIEW_RESIDUES)
            .map(|(_, _, name)| three_to_one(name))
            .collect();
        if self.residues.len() > PREVIEW_RESIDUES {
            sequence_preview.push_str("...");
        }

        ChainSummary {
            chain_id: self.chain_id,
            num_residues: self.residues.len(),
            residue_start: numbers.first().copied(),
            residue_end: numbers.last().copied(),
            segments,
            sequence_preview,
        }
    }
}

/// One-letter code for a standard amino acid, `X` otherwise
pub fn three_to_one(name: &str) -> char {
    match name.trim().to_ascii_uppercase().as_str() {
        "ALA" => 'A',
        "ARG" => 'R',
        "ASN" => 'N',
        "ASP" => 'D',
        "CYS" => 'C',
        "GLN" => 'Q',
        "GLU" => 'E',
        "GLY" => 'G',
        "HIS" => 'H',
        "ILE" => 'I',
        "LEU" => 'L',
        "LYS" => 'K',
        "MET" => 'M',
        "PHE" => 'F',
        "PRO" => 'P',
        "SER" => 'S',
        "THR" => 'T',
        "TRP" => 'W',
        "TYR" => 'Y',
        "VAL" => 'V',
        "SEC" => 'U',
        "PYL" => 'O',
        _ => 'X',
    }
}

fn column(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

/// Summarize PDB text
pub fn analyze(text: &str) -> StructureSummary {
    let mut chains: Vec<ChainBuilder> = Vec::new();

    for line in text.lines() {
        if line.starts_with("ENDMDL") {
            break;
        }
        let polymer = line.starts_with("ATOM  ") || line.starts_with("ATOM ");
        if !polymer && !line.starts_with("HETATM") {
            continue;
        }

        let chain_id = column(line, 21, 22).to_string();
        let chain = match chains.iter().position(|c| c.chain_id == chain_id) {
            Some(index) => &mut chains[index],
            None => {
                chains.push(ChainBuilder {
                    chain_id,
                    ..Default::default()
                });
                let last = chains.len() - 1;
                &mut chains[last]
            }
        };
        chain.atoms += 1;

        if !polymer {
            continue;
        }
        let Ok(number) = column(line, 22, 26).parse::<i64>() else {
            continue;
        };
        let insertion = column(line, 26, 27).chars().next().unwrap_or(' ');
        let name = column(line, 17, 20);

        let is_new = chain
            .residues
            .last()
            .map_or(true, |(n, i, _)| *n != number || *i != insertion);
        if is_new {
            chain.residues.push((number, insertion, name.to_string()));
        }
    }

    let total_atoms = chains.iter().map(|c| c.atoms).sum();
    let chains: Vec<ChainSummary> = chains.into_iter().map(ChainBuilder::finish).collect();
    let total_residues = chains.iter().map(|c| c.num_residues).sum();

    StructureSummary {
        num_chains: chains.len(),
        chains,
        total_residues,
        total_atoms,
    }
}
