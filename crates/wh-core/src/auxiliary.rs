//! Auxiliary sources folded into another entity type's import

use crate::entity::ChildRecord;
use crate::record::RecordSet;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Model field holding the damage table rows
pub const DAMAGE_FIELD: &str = "damage_table";

/// Kind tag of each damage table child record
pub const DAMAGE_ROW_KIND: &str = "damage_row";

/// Label of the wound bracket column
const WOUNDS_LABEL: &str = "RemainingW";

/// Label restricting a table to one model of the datasheet
const MODEL_LABEL: &str = "model";

/// Damage tables of every datasheet, keyed by datasheet wid
///
/// In the source, line 0 of a datasheet holds the column labels and the
/// following lines hold one wound bracket each. Blank labels mark columns
/// the datasheet does not use.
#[derive(Debug, Clone, Default)]
pub struct DamageTables {
    tables: HashMap<String, BTreeMap<u32, Vec<(String, String)>>>,
}

impl DamageTables {
    /// Build the tables from the parsed auxiliary source
    pub fn from_records(set: &RecordSet) -> Self {
        let mut labels: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut tables: HashMap<String, BTreeMap<u32, Vec<(String, String)>>> = HashMap::new();

        for record in &set.records {
            let (Some(datasheet_id), Some(line)) = (record.get("datasheet_id"), record.get("line"))
            else {
                continue;
            };
            let Ok(line) = line.trim().parse::<u32>() else {
                warn!(datasheet_id, line, "skipping damage row with invalid line");
                continue;
            };

            let data_columns = set
                .columns
                .iter()
                .filter(|c| c.as_str() != "datasheet_id" && c.as_str() != "line");

            if line == 0 {
                let header = data_columns
                    .filter_map(|c| {
                        record
                            .get_non_empty(c)
                            .map(|label| (c.clone(), label.to_string()))
                    })
                    .collect();
                labels.insert(datasheet_id.to_string(), header);
                continue;
            }

            let Some(header) = labels.get(datasheet_id) else {
                warn!(datasheet_id, line, "damage row without a label line");
                continue;
            };

            let row = data_columns
                .filter_map(|c| {
                    header
                        .get(c)
                        .map(|label| (label.clone(), record.get(c).unwrap_or_default().to_string()))
                })
                .collect();
            tables
                .entry(datasheet_id.to_string())
                .or_default()
                .insert(line, row);
        }

        Self { tables }
    }

    /// Number of datasheets with a damage table
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Child records for one model, if the datasheet's table applies to it
    ///
    /// A table with a `model` column belongs to the model of that name;
    /// otherwise it belongs to the first model line of the datasheet.
    pub fn children_for(
        &self,
        datasheet_id: &str,
        model_name: &str,
        model_line: &str,
    ) -> Option<Vec<ChildRecord>> {
        let table = self.tables.get(datasheet_id)?;
        let first = table.values().next()?;

        match first.iter().find(|(label, _)| label == MODEL_LABEL) {
            Some((_, model)) if model != model_name => return None,
            None if model_line.trim() != "1" => return None,
            _ => {}
        }

        let mut children = Vec::new();
        for row in table.values() {
            let wounds = row
                .iter()
                .find(|(label, _)| label == WOUNDS_LABEL)
                .map(|(_, v)| v.as_str())
                .unwrap_or_default();

            for (label, value) in row {
                if label == WOUNDS_LABEL || label == MODEL_LABEL {
                    continue;
                }
                children.push(
                    ChildRecord::new(DAMAGE_ROW_KIND)
                        .with("wounds", wounds)
                        .with("label", label.clone())
                        .with("value", value.clone()),
                );
            }
        }
        Some(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_csv_str, ParseOptions};

    const DAMAGE: &str = "datasheet_id|line|Col1|Col2|Col3|Col4|\n\
        000000100|0|RemainingW|M|BS||\n\
        000000100|1|7-12+|12\"|3+||\n\
        000000100|2|4-6|8\"|4+||\n\
        000000200|0|RemainingW|model|A||\n\
        000000200|1|5-8+|Vortex Beast|4||\n";

    fn tables() -> DamageTables {
        let set = parse_csv_str(DAMAGE, "Datasheets_damage.csv", None, &ParseOptions::default())
            .unwrap();
        DamageTables::from_records(&set)
    }

    #[test]
    fn test_first_model_receives_table() {
        let tables = tables();
        assert_eq!(tables.len(), 2);

        let rows = tables.children_for("000000100", "Land Raider", "1").unwrap();
        // Two brackets, two labelled columns each, blank column skipped
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].values["wounds"], "7-12+");
        assert_eq!(rows[0].values["label"], "M");
        assert_eq!(rows[0].values["value"], "12\"");
        assert_eq!(rows[3].values["wounds"], "4-6");
        assert_eq!(rows[3].values["label"], "BS");

        assert!(tables.children_for("000000100", "Land Raider", "2").is_none());
    }

    #[test]
    fn test_model_column_selects_model() {
        let tables = tables();

        assert!(tables.children_for("000000200", "Rider", "1").is_none());
        let rows = tables.children_for("000000200", "Vortex Beast", "2").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values["label"], "A");
        assert_eq!(rows[0].values["value"], "4");
    }

    #[test]
    fn test_unknown_datasheet() {
        assert!(tables().children_for("000000999", "x", "1").is_none());
    }
}
