//! The parsed result for one patient, as cached.

use super::{
    Consult, CptCode, Diagnosis, Document, EntityMap, HealthFactor, LabResult, Medication, Order,
    PatientDemographics, Problem, PurposeOfVisit, Treatment, Visit, VitalSign,
};
use crate::constants::COLLECTION_CACHE_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_cache_version() -> String {
    COLLECTION_CACHE_VERSION.to_owned()
}

/// Every entity parsed from one VPR fetch.
///
/// Built once by the parser and not modified afterwards. Each keyed collection holds entities
/// in newest-first order where the entity carries a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDataCollection {
    pub demographics: PatientDemographics,
    #[serde(default)]
    pub vital_signs: EntityMap<VitalSign>,
    #[serde(default)]
    pub lab_results: EntityMap<LabResult>,
    #[serde(default)]
    pub consults: EntityMap<Consult>,
    #[serde(default)]
    pub medications: EntityMap<Medication>,
    #[serde(default)]
    pub visits: EntityMap<Visit>,
    #[serde(default)]
    pub health_factors: EntityMap<HealthFactor>,
    #[serde(default)]
    pub treatments: EntityMap<Treatment>,
    #[serde(default)]
    pub diagnoses: EntityMap<Diagnosis>,
    #[serde(default)]
    pub purpose_of_visits: EntityMap<PurposeOfVisit>,
    #[serde(default)]
    pub problems: EntityMap<Problem>,
    #[serde(default)]
    pub orders: EntityMap<Order>,
    #[serde(default)]
    pub documents: EntityMap<Document>,
    #[serde(default)]
    pub cpt_codes: EntityMap<CptCode>,
    pub source_station: String,
    pub source_dfn: String,
    #[serde(default)]
    pub source_icn: Option<String>,
    pub retrieved_at: DateTime<Utc>,
    #[serde(default = "default_cache_version")]
    pub cache_version: String,
    /// Number of raw items in the VPR document, parsed or not.
    #[serde(default)]
    pub total_items: usize,
}

impl PatientDataCollection {
    /// An empty collection around `demographics`.
    pub fn new(
        demographics: PatientDemographics,
        source_station: impl Into<String>,
        source_dfn: impl Into<String>,
    ) -> Self {
        let source_icn = demographics.icn.clone();
        Self {
            demographics,
            vital_signs: EntityMap::new(),
            lab_results: EntityMap::new(),
            consults: EntityMap::new(),
            medications: EntityMap::new(),
            visits: EntityMap::new(),
            health_factors: EntityMap::new(),
            treatments: EntityMap::new(),
            diagnoses: EntityMap::new(),
            purpose_of_visits: EntityMap::new(),
            problems: EntityMap::new(),
            orders: EntityMap::new(),
            documents: EntityMap::new(),
            cpt_codes: EntityMap::new(),
            source_station: source_station.into(),
            source_dfn: source_dfn.into(),
            source_icn,
            retrieved_at: Utc::now(),
            cache_version: default_cache_version(),
            total_items: 0,
        }
    }

    pub fn patient_name(&self) -> &str {
        &self.demographics.full_name
    }

    pub fn patient_icn(&self) -> Option<&str> {
        self.demographics
            .icn
            .as_deref()
            .or(self.source_icn.as_deref())
    }

    pub fn has_clinical_data(&self) -> bool {
        !(self.vital_signs.is_empty()
            && self.lab_results.is_empty()
            && self.consults.is_empty()
            && self.visits.is_empty())
    }

    pub fn abnormal_labs(&self) -> impl Iterator<Item = &LabResult> {
        self.lab_results.iter().filter(|lab| lab.is_abnormal())
    }

    pub fn critical_labs(&self) -> impl Iterator<Item = &LabResult> {
        self.lab_results.iter().filter(|lab| lab.is_critical())
    }

    pub fn active_consults(&self) -> impl Iterator<Item = &Consult> {
        self.consults.iter().filter(|consult| consult.is_active())
    }

    pub fn overdue_consults(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Consult> {
        self.consults
            .iter()
            .filter(move |consult| consult.is_overdue(now))
    }

    pub fn active_medications(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Medication> {
        self.medications.iter().filter(move |med| med.is_active(now))
    }

    /// Visits whose VistA status code is `active`.
    pub fn active_visits(&self) -> impl Iterator<Item = &Visit> {
        self.visits
            .iter()
            .filter(|visit| visit.status_code.eq_ignore_ascii_case("active"))
    }

    pub fn inpatient_visits(&self) -> impl Iterator<Item = &Visit> {
        self.visits.iter().filter(|visit| visit.is_inpatient())
    }

    pub fn emergency_visits(&self) -> impl Iterator<Item = &Visit> {
        self.visits.iter().filter(|visit| visit.is_emergency())
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|order| order.is_active())
    }

    pub fn summary(&self, now: DateTime<Utc>) -> CollectionSummary {
        let demographics = &self.demographics;
        CollectionSummary {
            patient: PatientSummary {
                name: demographics.full_name.clone(),
                icn: self.patient_icn().map(str::to_owned),
                age: demographics.calculate_age(now.date_naive()),
                gender: demographics.gender_name.clone(),
                ssn: demographics.ssn.clone(),
                phone: demographics.primary_phone().map(str::to_owned),
            },
            vital_signs: VitalCounts {
                total: self.vital_signs.len(),
                has_abnormal: self.vital_signs.iter().any(VitalSign::is_abnormal),
            },
            lab_results: LabCounts {
                total: self.lab_results.len(),
                abnormal: self.abnormal_labs().count(),
                critical: self.critical_labs().count(),
            },
            consults: ConsultCounts {
                total: self.consults.len(),
                active: self.active_consults().count(),
                overdue: self.overdue_consults(now).count(),
            },
            medications: MedicationCounts {
                total: self.medications.len(),
                active: self.active_medications(now).count(),
            },
            visits: VisitCounts {
                total: self.visits.len(),
                active: self.active_visits().count(),
                inpatient: self.inpatient_visits().count(),
                emergency: self.emergency_visits().count(),
            },
            health_factors: self.health_factors.len(),
            diagnoses: self.diagnoses.len(),
            problems: self.problems.len(),
            orders: self.orders.len(),
            documents: self.documents.len(),
            cpt_codes: self.cpt_codes.len(),
            retrieved_at: self.retrieved_at,
            total_items: self.total_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub name: String,
    pub icn: Option<String>,
    pub age: i32,
    pub gender: String,
    pub ssn: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitalCounts {
    pub total: usize,
    pub has_abnormal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabCounts {
    pub total: usize,
    pub abnormal: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultCounts {
    pub total: usize,
    pub active: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationCounts {
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCounts {
    pub total: usize,
    pub active: usize,
    pub inpatient: usize,
    pub emergency: usize,
}

/// Headline counts for a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub patient: PatientSummary,
    pub vital_signs: VitalCounts,
    pub lab_results: LabCounts,
    pub consults: ConsultCounts,
    pub medications: MedicationCounts,
    pub visits: VisitCounts,
    pub health_factors: usize,
    pub diagnoses: usize,
    pub problems: usize,
    pub orders: usize,
    pub documents: usize,
    pub cpt_codes: usize,
    pub retrieved_at: DateTime<Utc>,
    pub total_items: usize,
}
