use std::collections::{HashMap, HashSet};

use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::data::GeneSetTerm;
use crate::enrichment::utils::getset;
use crate::error::{GeneSetError, Result};

/// Gene set membership index.
///
/// Membership is stored as a sparse incidence matrix with one row per gene set and
/// one column per gene, plus its transpose for gene-to-set lookups. Member lists are
/// sorted by gene index and contain each gene once.
///
/// The units of an index are usually genes. After [`GeneSetIndex::expand_to_elements`]
/// they are elements, and each unit remembers the gene it measures.
#[derive(Debug, Clone)]
pub struct GeneSetIndex {
    genes: Vec<String>,
    unit_genes: Vec<String>,
    gene_lookup: HashMap<String, usize>,
    terms: Vec<GeneSetTerm>,
    term_lookup: HashMap<String, usize>,
    membership: CsrMatrix<f64>,
    gene_sets: CsrMatrix<f64>,
}

#[derive(Debug, Default)]
pub struct GeneSetIndexBuilder {
    genes: Vec<String>,
    unit_genes: Vec<String>,
    gene_lookup: HashMap<String, usize>,
    terms: Vec<GeneSetTerm>,
    term_lookup: HashMap<String, usize>,
    memberships: Vec<(usize, usize)>,
}

impl GeneSetIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gene; returns its index. Registering twice is a no-op.
    pub fn add_gene(&mut self, gene: &str) -> usize {
        self.add_unit(gene, gene)
    }

    /// Register an element measuring `gene`; returns its index.
    pub fn add_element(&mut self, element: &str, gene: &str) -> usize {
        self.add_unit(element, gene)
    }

    fn add_unit(&mut self, unit: &str, gene: &str) -> usize {
        if let Some(&idx) = self.gene_lookup.get(unit) {
            return idx;
        }
        let idx = self.genes.len();
        self.genes.push(unit.to_string());
        self.unit_genes.push(gene.to_string());
        self.gene_lookup.insert(unit.to_string(), idx);
        idx
    }

    pub fn add_term(&mut self, term: GeneSetTerm) -> Result<usize> {
        if self.term_lookup.contains_key(&term.id) {
            return Err(GeneSetError::input(format!(
                "gene set {} was added twice",
                term.id
            )));
        }
        let idx = self.terms.len();
        self.term_lookup.insert(term.id.clone(), idx);
        self.terms.push(term);
        Ok(idx)
    }

    /// Annotate `gene` to the gene set `term_id`, registering the gene if needed.
    pub fn annotate(&mut self, gene: &str, term_id: &str) -> Result<()> {
        let term_idx = *self.term_lookup.get(term_id).ok_or_else(|| {
            GeneSetError::input(format!("unknown gene set {} for gene {}", term_id, gene))
        })?;
        let gene_idx = self.add_gene(gene);
        self.memberships.push((term_idx, gene_idx));
        Ok(())
    }

    pub fn build(mut self) -> GeneSetIndex {
        self.memberships.sort_unstable();
        self.memberships.dedup();

        let mut coo = CooMatrix::new(self.terms.len(), self.genes.len());
        for &(term_idx, gene_idx) in &self.memberships {
            coo.push(term_idx, gene_idx, 1.0);
        }
        let membership = CsrMatrix::from(&coo);
        let gene_sets = membership.transpose();

        GeneSetIndex {
            genes: self.genes,
            unit_genes: self.unit_genes,
            gene_lookup: self.gene_lookup,
            terms: self.terms,
            term_lookup: self.term_lookup,
            membership,
            gene_sets,
        }
    }
}

impl GeneSetIndex {
    /// Build an index from a gene universe and a list of gene sets.
    ///
    /// Genes named by a set but missing from `universe` are added to it.
    pub fn from_gene_sets<G, S>(
        universe: impl IntoIterator<Item = G>,
        sets: impl IntoIterator<Item = (GeneSetTerm, Vec<S>)>,
    ) -> Result<Self>
    where
        G: AsRef<str>,
        S: AsRef<str>,
    {
        let mut builder = GeneSetIndexBuilder::new();
        for gene in universe {
            builder.add_gene(gene.as_ref());
        }
        for (term, members) in sets {
            let id = term.id.clone();
            builder.add_term(term)?;
            for gene in members {
                builder.annotate(gene.as_ref(), &id)?;
            }
        }
        Ok(builder.build())
    }

    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn terms(&self) -> &[GeneSetTerm] {
        &self.terms
    }

    pub fn term(&self, term_idx: usize) -> &GeneSetTerm {
        &self.terms[term_idx]
    }

    pub fn gene_index(&self, gene: &str) -> Option<usize> {
        self.gene_lookup.get(gene).copied()
    }

    pub fn term_index(&self, term_id: &str) -> Option<usize> {
        self.term_lookup.get(term_id).copied()
    }

    /// Gene indices of the members of a gene set, ascending.
    pub fn set_members(&self, term_idx: usize) -> &[usize] {
        getset(
            self.membership.col_indices(),
            self.membership.row_offsets(),
            term_idx,
        )
    }

    pub fn set_size(&self, term_idx: usize) -> usize {
        self.set_members(term_idx).len()
    }

    /// Gene measured by the unit at `unit_idx`; the unit itself unless expanded.
    pub fn unit_gene(&self, unit_idx: usize) -> &str {
        &self.unit_genes[unit_idx]
    }

    /// Number of distinct genes among the units at `members`.
    pub fn distinct_genes(&self, members: &[usize]) -> usize {
        members
            .iter()
            .map(|&u| self.unit_genes[u].as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Indices of the gene sets a gene belongs to, ascending.
    pub fn gene_sets(&self, gene_idx: usize) -> &[usize] {
        getset(
            self.gene_sets.col_indices(),
            self.gene_sets.row_offsets(),
            gene_idx,
        )
    }

    /// Restrict the index to the genes accepted by `keep`.
    ///
    /// Every gene set is retained (possibly empty); gene order is preserved.
    pub fn prune<F>(&self, keep: F) -> GeneSetIndex
    where
        F: Fn(&str) -> bool,
    {
        let mut builder = GeneSetIndexBuilder::new();
        let mut remap = vec![None; self.genes.len()];
        for (idx, gene) in self.genes.iter().enumerate() {
            if keep(gene) {
                remap[idx] = Some(builder.add_unit(gene, &self.unit_genes[idx]));
            }
        }
        for (term_idx, term) in self.terms.iter().enumerate() {
            builder.terms.push(term.clone());
            builder.term_lookup.insert(term.id.clone(), term_idx);
            for &gene_idx in self.set_members(term_idx) {
                if let Some(new_idx) = remap[gene_idx] {
                    builder.memberships.push((term_idx, new_idx));
                }
            }
        }
        builder.build()
    }

    /// Re-express the index over elements instead of genes.
    ///
    /// Each `(element, gene)` pair becomes a unit of the new universe that belongs to
    /// every gene set of its gene. Elements whose gene is not in the index are dropped.
    pub fn expand_to_elements(&self, element_genes: &[(String, String)]) -> GeneSetIndex {
        let mut builder = GeneSetIndexBuilder::new();
        for term in &self.terms {
            builder.term_lookup.insert(term.id.clone(), builder.terms.len());
            builder.terms.push(term.clone());
        }
        for (element, gene) in element_genes {
            let Some(gene_idx) = self.gene_index(gene) else {
                continue;
            };
            let element_idx = builder.add_element(element, gene);
            for &term_idx in self.gene_sets(gene_idx) {
                builder.memberships.push((term_idx, element_idx));
            }
        }
        builder.build()
    }

    /// Flags gene sets whose membership duplicates an earlier gene set.
    ///
    /// Empty sets are never flagged.
    pub fn redundant_sets(&self) -> Vec<bool> {
        let mut seen: HashSet<&[usize]> = HashSet::new();
        let mut redundant = vec![false; self.terms.len()];
        for (term_idx, flag) in redundant.iter_mut().enumerate() {
            let members = self.set_members(term_idx);
            if members.is_empty() {
                continue;
            }
            if !seen.insert(members) {
                *flag = true;
            }
        }
        redundant
    }
}
