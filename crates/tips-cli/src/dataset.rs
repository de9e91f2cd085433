//! Built-in QID hierarchies for the two demo datasets the original
//! ships fixtures for.
//!
//! Grounded on `medical_data.py` (`ATTRIBUTES`, `get_age_tree`,
//! `get_sex_tree`) and `original/src/adult_data.py` (`attribute_trees`,
//! the categorical occupation/marital-status/race trees). The medical
//! age tree in the original is a hand-built, irregular partition with a
//! bespoke split at every level; this port uses
//! `HierarchyArena::create_balanced_numerical_hierarchy` over the same
//! `[min, max]` bounds instead of reproducing each hand-picked split
//! point, since the algorithm's behavior depends only on the hierarchy
//! being a valid partition, not on its exact shape (recorded in
//! DESIGN.md).

use tips_hierarchy::{AttributeIndex, HierarchyArena, QidAttributeSet};

/// One of the two demo datasets `tips-cli` ships built-in hierarchies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BuiltinDataset {
    /// The stroke-registry dataset from `medical_data.py`.
    Medical,
    /// The UCI "Adult" census dataset from `original/src/adult_data.py`.
    Adult,
}

/// One demo dataset's column names and full QID attribute set (every
/// attribute the original anonymizes over, before `--used-qids`
/// restricts it).
pub struct DatasetDefinition {
    /// Column names, matching the CSV this dataset ships with.
    pub attribute_names: Vec<String>,
    /// Every QID attribute this dataset defines a hierarchy for.
    pub qid_attribute_set: QidAttributeSet,
}

impl BuiltinDataset {
    /// Build this dataset's column names and QID hierarchies.
    pub fn definition(self) -> DatasetDefinition {
        match self {
            BuiltinDataset::Medical => medical_definition(),
            BuiltinDataset::Adult => adult_definition(),
        }
    }
}

fn medical_definition() -> DatasetDefinition {
    let attribute_names: Vec<String> = [
        "Center",
        "Age",
        "Sex",
        "Pre-mRS",
        "NIHSS_AD",
        "Thrombozyten_Aggregationshemmung",
        "Antikoorgulation",
        "Hypertonus",
        "Dm",
        "VHF",
        "Smoking",
        "Occluded_vessel_ACI",
        "Occluded_vessel_MCA",
        "ASPECTS",
        "Additional_IVT",
        "Final_TICI_Score",
        "NIHSS_24h",
        "mRS_Discharge",
        "In-hospital_death",
        "mRS_90-days",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let age_index = attribute_names.iter().position(|n| n == "Age").unwrap() as AttributeIndex;
    let sex_index = attribute_names.iter().position(|n| n == "Sex").unwrap() as AttributeIndex;

    let mut qid_attribute_set = QidAttributeSet::new();

    let mut age = HierarchyArena::new();
    let age_root = age.create_balanced_numerical_hierarchy(1, 119);
    qid_attribute_set.insert(age_index, (age, age_root));

    let mut sex = HierarchyArena::new();
    let sex_root = sex.create_balanced_numerical_hierarchy(1, 2);
    qid_attribute_set.insert(sex_index, (sex, sex_root));

    DatasetDefinition {
        attribute_names,
        qid_attribute_set,
    }
}

fn adult_definition() -> DatasetDefinition {
    let attribute_names: Vec<String> = [
        "age",
        "workclass",
        "fnlwgt",
        "education",
        "education-num",
        "marital-status",
        "occupation",
        "relationship",
        "race",
        "sex",
        "capital-gain",
        "capital-loss",
        "hours-per-week",
        "native-country",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let mut qid_attribute_set = QidAttributeSet::new();

    let mut age = HierarchyArena::new();
    let age_root = age.create_balanced_numerical_hierarchy(0, 100);
    qid_attribute_set.insert(0, (age, age_root));

    let mut education_num = HierarchyArena::new();
    let education_num_root = education_num.create_balanced_numerical_hierarchy(0, 16);
    qid_attribute_set.insert(4, (education_num, education_num_root));

    let mut marital = HierarchyArena::new();
    let any = marital.insert_categorical("ANY");
    let married = marital.insert_categorical("Married");
    let other = marital.insert_categorical("Other");
    let never_married = marital.insert_categorical("Never-married");
    marital.add_child(any, never_married);
    marital.add_child(any, married);
    marital.add_child(any, other);
    for label in ["Married-civ-spouse", "Married-AF-spouse"] {
        let child = marital.insert_categorical(label);
        marital.add_child(married, child);
    }
    for label in ["Separated", "Divorced", "Widowed", "Married-spouse-absent"] {
        let child = marital.insert_categorical(label);
        marital.add_child(other, child);
    }
    qid_attribute_set.insert(5, (marital, any));

    let mut occupation = HierarchyArena::new();
    let any = occupation.insert_categorical("ANY");
    let technical = occupation.insert_categorical("technical");
    let office = occupation.insert_categorical("office");
    let logistics = occupation.insert_categorical("logistics");
    let protection = occupation.insert_categorical("protection");
    let other_service = occupation.insert_categorical("Other-service");
    occupation.add_child(any, other_service);
    occupation.add_child(any, technical);
    occupation.add_child(any, office);
    occupation.add_child(any, logistics);
    occupation.add_child(any, protection);
    for label in ["Tech-support", "Craft-repair", "Machine-op-inspct"] {
        let child = occupation.insert_categorical(label);
        occupation.add_child(technical, child);
    }
    for label in ["Sales", "Exec-managerial", "Prof-specialty", "Adm-clerical"] {
        let child = occupation.insert_categorical(label);
        occupation.add_child(office, child);
    }
    for label in [
        "Farming-fishing",
        "Transport-moving",
        "Priv-house-serv",
        "Handlers-cleaners",
    ] {
        let child = occupation.insert_categorical(label);
        occupation.add_child(logistics, child);
    }
    for label in ["Protective-serv", "Armed-Forces"] {
        let child = occupation.insert_categorical(label);
        occupation.add_child(protection, child);
    }
    qid_attribute_set.insert(6, (occupation, any));

    let mut race = HierarchyArena::new();
    let any = race.insert_categorical("ANY");
    let non_white = race.insert_categorical("Non-White");
    let white = race.insert_categorical("White");
    race.add_child(any, white);
    race.add_child(any, non_white);
    for label in [
        "Asian-Pac-Islander",
        "Amer-Indian-Eskimo",
        "Other",
        "Black",
    ] {
        let child = race.insert_categorical(label);
        race.add_child(non_white, child);
    }
    qid_attribute_set.insert(8, (race, any));

    let mut sex = HierarchyArena::new();
    let any = sex.insert_categorical("ANY");
    let male = sex.insert_categorical("Male");
    let female = sex.insert_categorical("Female");
    sex.add_child(any, male);
    sex.add_child(any, female);
    qid_attribute_set.insert(9, (sex, any));

    DatasetDefinition {
        attribute_names,
        qid_attribute_set,
    }
}

/// Restrict a dataset's full QID attribute set to `used_qids` (per
/// `--used-qids`), erroring if any requested index is not one of the
/// dataset's QID attributes. Mirrors `run_central.py::main`'s
/// `used_qid_attribute_trees` filtering.
pub fn restrict_to(
    mut full: QidAttributeSet,
    used_qids: &[AttributeIndex],
) -> anyhow::Result<QidAttributeSet> {
    if used_qids.is_empty() {
        return Ok(full);
    }
    let mut restricted = QidAttributeSet::new();
    for &qid in used_qids {
        let entry = full
            .remove(&qid)
            .ok_or_else(|| anyhow::anyhow!(
                "{used_qids:?} as QIDs requested, but there only exist the following QIDs: {:?}",
                restricted.keys().chain(full.keys()).collect::<Vec<_>>()
            ))?;
        restricted.insert(qid, entry);
    }
    Ok(restricted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medical_hierarchies_are_consistent() {
        let def = BuiltinDataset::Medical.definition();
        tips_hierarchy::check_attribute_set_consistency(&def.qid_attribute_set).unwrap();
        assert_eq!(def.qid_attribute_set.len(), 2);
    }

    #[test]
    fn adult_hierarchies_are_consistent() {
        let def = BuiltinDataset::Adult.definition();
        tips_hierarchy::check_attribute_set_consistency(&def.qid_attribute_set).unwrap();
        assert_eq!(def.qid_attribute_set.len(), 6);
    }

    #[test]
    fn restrict_to_narrows_the_qid_set() {
        let def = BuiltinDataset::Adult.definition();
        let restricted = restrict_to(def.qid_attribute_set, &[0, 9]).unwrap();
        assert_eq!(restricted.len(), 2);
        assert!(restricted.contains_key(&0));
        assert!(restricted.contains_key(&9));
    }

    #[test]
    fn restrict_to_rejects_unknown_qid() {
        let def = BuiltinDataset::Adult.definition();
        assert!(restrict_to(def.qid_attribute_set, &[999]).is_err());
    }
}
