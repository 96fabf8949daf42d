use serde::{Deserialize, Deserializer};
use std::io::Read;

/// One line of a catalog export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogRow {
    pub school_code: String,
    pub school_name: String,
    pub course_code: String,
    pub course_name: String,
    pub course_cost: u64,
    pub subject_code: String,
    pub subject_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub teacher_email: Option<String>,
}

pub(crate) fn parse_rows<R: Read>(reader: R) -> Result<Vec<CatalogRow>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv_reader
        .deserialize::<CatalogRow>()
        .map(|record| {
            record.map(|mut row| {
                row.teacher_email = row.teacher_email.map(|email| email.to_ascii_lowercase());
                row
            })
        })
        .collect()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
