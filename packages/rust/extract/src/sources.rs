//! Publisher name standardization.
//!
//! Full names match by case-insensitive containment, in table order.
//! Abbreviations match only as whole, upper-case words so that ordinary
//! words ("who", "fao") in a long publisher string do not trigger a match.

use std::sync::LazyLock;

use regex::Regex;

use recallbrief_shared::SourceTag;

/// Lower-case full-name fragments, checked in order.
const FULL_NAMES: &[(&str, SourceTag)] = &[
    ("food safety authority of ireland", SourceTag::Fsai),
    ("food standards australia new zealand", SourceTag::Fsanz),
    ("ministry for primary industries", SourceTag::NzMpi),
    ("canadian food inspection agency", SourceTag::Cfia),
    ("government of canada", SourceTag::Canada),
    ("food standards agency", SourceTag::UkFsa),
    ("food and drug administration", SourceTag::UsFda),
    ("food safety and inspection service", SourceTag::UsFsis),
    ("california department of public health", SourceTag::UsCdph),
    ("california department of publichealth", SourceTag::UsCdph),
    ("food standards scotland", SourceTag::Fss),
    ("food and agriculture organization", SourceTag::Fao),
    ("world organisation for animal health", SourceTag::Woah),
    ("world organisationfor animal health", SourceTag::Woah),
    ("world health organization", SourceTag::Who),
    ("alim'agri", SourceTag::FrenchMinistry),
    ("french ministry of agriculture and food", SourceTag::FrenchMinistry),
    ("european food safety authority", SourceTag::Efsa),
    ("australian competition & consumer commission", SourceTag::Accc),
    ("michigan department of agriculture and rural development", SourceTag::Mdard),
    ("oregon health authority", SourceTag::Oha),
    ("消費者廳", SourceTag::JapanCaa),
    ("消費者庁", SourceTag::JapanCaa),
    ("consumer affairs agency", SourceTag::JapanCaa),
    ("rapid alert system for food and feed", SourceTag::Rasff),
    ("rappel conso", SourceTag::RappelConso),
    ("nsw food authority", SourceTag::NswFoodAuthority),
    ("香港食物安全中心", SourceTag::HongKongCfs),
    ("centre for food safety", SourceTag::HongKongCfs),
];

const ABBREVIATIONS: &[(&str, SourceTag)] = &[
    ("FSANZ", SourceTag::Fsanz),
    ("FSAI", SourceTag::Fsai),
    ("MPI", SourceTag::NzMpi),
    ("CFIA", SourceTag::Cfia),
    ("FSA", SourceTag::UkFsa),
    ("FDA", SourceTag::UsFda),
    ("FSIS", SourceTag::UsFsis),
    ("CDPH", SourceTag::UsCdph),
    ("FSS", SourceTag::Fss),
    ("FAO", SourceTag::Fao),
    ("WOAH", SourceTag::Woah),
    ("WHO", SourceTag::Who),
    ("EFSA", SourceTag::Efsa),
    ("ACCC", SourceTag::Accc),
    ("MDARD", SourceTag::Mdard),
    ("OHA", SourceTag::Oha),
    ("RASFF", SourceTag::Rasff),
];

static ABBREVIATION_RES: LazyLock<Vec<(Regex, SourceTag)>> = LazyLock::new(|| {
    ABBREVIATIONS
        .iter()
        .map(|(abbr, tag)| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(abbr))).expect("valid regex");
            (re, tag.clone())
        })
        .collect()
});

/// Map a publisher name to its source tag; unknown names become `Other`.
pub fn standardize_source(publisher: &str) -> SourceTag {
    let trimmed = publisher.trim();
    if trimmed.is_empty() {
        return SourceTag::Other(String::new());
    }

    let lower = trimmed.to_lowercase();
    if let Some((_, tag)) = FULL_NAMES.iter().find(|(name, _)| lower.contains(name)) {
        return tag.clone();
    }

    if let Some((_, tag)) = ABBREVIATION_RES.iter().find(|(re, _)| re.is_match(trimmed)) {
        return tag.clone();
    }

    SourceTag::Other(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_names_by_containment() {
        assert_eq!(
            standardize_source("The Food Standards Australia New Zealand (FSANZ)"),
            SourceTag::Fsanz
        );
        assert_eq!(
            standardize_source("Ministry for Primary Industries (MPI)"),
            SourceTag::NzMpi
        );
        assert_eq!(
            standardize_source("California Department of PublicHealth (CDPH)"),
            SourceTag::UsCdph
        );
        assert_eq!(standardize_source("Government of Canada"), SourceTag::Canada);
        assert_eq!(
            standardize_source("The Canadian Food Inspection Agency (CFIA)"),
            SourceTag::Cfia
        );
        assert_eq!(standardize_source("消費者廳"), SourceTag::JapanCaa);
        assert_eq!(standardize_source("香港食物安全中心"), SourceTag::HongKongCfs);
        assert_eq!(standardize_source("Rappel Conso"), SourceTag::RappelConso);
        assert_eq!(standardize_source("NSW Food Authority"), SourceTag::NswFoodAuthority);
    }

    #[test]
    fn abbreviations_need_whole_words() {
        assert_eq!(standardize_source("RASFF"), SourceTag::Rasff);
        assert_eq!(standardize_source("FDA press office"), SourceTag::UsFda);
        // "FSA" inside "FSANZ" must not match the UK agency.
        assert_eq!(standardize_source("FSANZ"), SourceTag::Fsanz);
        assert_eq!(
            standardize_source("people who recall"),
            SourceTag::Other("people who recall".into())
        );
    }

    #[test]
    fn unknown_publisher_is_other() {
        assert_eq!(
            standardize_source("  Local Health Unit "),
            SourceTag::Other("Local Health Unit".into())
        );
        assert_eq!(standardize_source(""), SourceTag::Other(String::new()));
    }
}
