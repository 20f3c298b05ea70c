//! Plain-text VCF output, one contig per file.

use std::io::Write;

use crate::coalescent::Variants;

/// Write `variants` as VCF 4.2.
///
/// Consecutive haplotypes are grouped into individuals of
/// `ploidy` each, named `msp_0`, `msp_1`, ... Every site is
/// biallelic with `A` as the ancestral and `T` as the derived
/// allele. Positions are 1-based and strictly increasing: a site
/// that collides with its predecessor is moved one base right.
/// Collisions near the end of the contig can therefore push the
/// last POS past the `##contig` length; sites are never dropped
/// or merged to keep them inside it.
pub fn write_vcf<W: Write>(
    variants: &Variants,
    ploidy: usize,
    contig: &str,
    out: &mut W,
) -> std::io::Result<()> {
    if ploidy == 0 || variants.num_samples() % ploidy != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "{} haplotypes cannot be grouped into individuals of ploidy {ploidy}",
                variants.num_samples()
            ),
        ));
    }
    let num_individuals = variants.num_samples() / ploidy;

    writeln!(out, "##fileformat=VCFv4.2")?;
    writeln!(out, "##source={} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "##FILTER=<ID=PASS,Description=\"All filters passed\">")?;
    writeln!(
        out,
        "##contig=<ID={contig},length={}>",
        variants.sequence_length()
    )?;
    writeln!(
        out,
        "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"
    )?;
    write!(out, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
    for i in 0..num_individuals {
        write!(out, "\tmsp_{i}")?;
    }
    writeln!(out)?;

    let mut last_position = 0_i64;
    let mut line = String::new();
    for site in variants.sites() {
        let raw: i64 = site.position.into();
        let position = (raw + 1).max(last_position + 1);
        last_position = position;

        line.clear();
        line.push_str(&format!("{contig}\t{position}\t.\tA\tT\t.\tPASS\t.\tGT"));
        for individual in 0..num_individuals {
            line.push('\t');
            for h in 0..ploidy {
                if h > 0 {
                    line.push('|');
                }
                let sample = individual * ploidy + h;
                line.push(if site.carries_derived(sample) { '1' } else { '0' });
            }
        }
        writeln!(out, "{line}")?;
    }
    Ok(())
}
