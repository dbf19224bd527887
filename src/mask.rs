//! Masking of filtered calls

use crate::record::{Genotype, TrRecord, FILTER_FIELD};

/// Rebuild `record` with every flagged sample turned into a no-call
///
/// Flagged genotypes become all-missing with their ploidy kept (or the
/// record's maximum ploidy for empty genotypes). All typed FORMAT values of
/// those samples become missing except the per-sample FILTER text. Allele
/// representations and full alleles carry over unchanged.
pub fn mask_samples(record: TrRecord, flagged: &[bool]) -> TrRecord {
    if !flagged.iter().any(|&f| f) {
        return record;
    }

    let max_ploidy = record.max_ploidy().max(1);
    let TrRecord {
        chrom,
        pos,
        record_id,
        motif,
        ref_allele,
        alt_alleles,
        full_alleles,
        genotypes,
        format,
        filter,
    } = record;

    let genotypes = genotypes
        .into_iter()
        .enumerate()
        .map(|(idx, gt)| {
            if flagged.get(idx).copied().unwrap_or(false) {
                let ploidy = match gt.ploidy() {
                    0 => max_ploidy,
                    p => p,
                };
                Genotype::new(vec![None; ploidy], gt.phased)
            } else {
                gt
            }
        })
        .collect();

    let format = format
        .into_iter()
        .map(|(name, values)| {
            if name == FILTER_FIELD {
                (name, values)
            } else {
                let masked = values.masked(flagged);
                (name, masked)
            }
        })
        .collect();

    TrRecord {
        chrom,
        pos,
        record_id,
        motif,
        ref_allele,
        alt_alleles,
        full_alleles,
        genotypes,
        format,
        filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Allele, FieldValues};

    fn record() -> TrRecord {
        TrRecord::new(
            "chr1",
            500,
            "AAAT",
            Allele::Length(12),
            vec![Allele::Length(16)],
            vec![Genotype::called(&[0, 1]), Genotype::called(&[1, 1])],
        )
        .with_full_alleles(vec!["GAAATAAATAAATC".to_string(), "GAAATAAATAAATAAATC".to_string()])
        .with_field(
            "DP",
            FieldValues::Integer(vec![vec![Some(20)], vec![Some(3)]]),
        )
        .unwrap()
        .with_field(
            "QEXP",
            FieldValues::Float(vec![
                vec![Some(0.9), Some(0.1), Some(0.0)],
                vec![Some(0.2), Some(0.3), Some(0.5)],
            ]),
        )
        .unwrap()
        .with_field(
            "REPCI",
            FieldValues::Text(vec![Some("3-3".to_string()), Some("4-4".to_string())]),
        )
        .unwrap()
        .with_field(
            FILTER_FIELD,
            FieldValues::Text(vec![Some("PASS".to_string()), Some("MinDepth_3".to_string())]),
        )
        .unwrap()
    }

    #[test]
    fn test_mask_flagged_sample() {
        let masked = mask_samples(record(), &[false, true]);

        assert_eq!(masked.genotypes[0], Genotype::called(&[0, 1]));
        assert_eq!(masked.genotypes[1], Genotype::missing(2));
        assert_eq!(masked.field("DP").unwrap().number(0), Some(20.0));
        assert_eq!(masked.field("DP").unwrap().number(1), None);
        assert_eq!(
            masked.field("QEXP").unwrap().numbers(1),
            vec![None, None, None]
        );
        assert_eq!(masked.field("REPCI").unwrap().text(1), None);
        assert_eq!(masked.field(FILTER_FIELD).unwrap().text(1), Some("MinDepth_3"));
    }

    #[test]
    fn test_mask_keeps_allele_representation() {
        let original = record();
        let masked = mask_samples(original.clone(), &[true, false]);
        assert_eq!(masked.ref_allele, Allele::Length(12));
        assert_eq!(masked.alt_alleles, vec![Allele::Length(16)]);
        assert_eq!(masked.full_alleles, original.full_alleles);
        assert_eq!(masked.num_called(), 1);
    }

    #[test]
    fn test_nothing_flagged_is_identity() {
        let original = record();
        assert_eq!(mask_samples(original.clone(), &[false, false]), original);
    }
}
