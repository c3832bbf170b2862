/// First grid row holding a parameter; rows 1..=3 are title, blank and header.
pub const FIRST_PARAM_ROW: u32 = 4;
pub const PARAM_COUNT: usize = 18;
pub const LAST_PARAM_ROW: u32 = FIRST_PARAM_ROW + PARAM_COUNT as u32 - 1;

/// The tallied parameters. Declaration order is sheet row order and must not
/// change: stored workbooks are read back by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    Extractions,
    OroFacialPainRelief,
    DentoAlveolarTrauma,
    SoftTissueInjuries,
    PostOpInfectionsBleeding,
    Tf,
    Gic,
    Composite,
    Scaling,
    Opmd,
    MinorOralSurgery,
    Referrals,
    Others,
    TotalAttendance,
    PregnantMothers,
    AgeUnder3,
    Age13To19,
    InwardPatients,
}

impl Parameter {
    pub const ALL: [Parameter; PARAM_COUNT] = [
        Parameter::Extractions,
        Parameter::OroFacialPainRelief,
        Parameter::DentoAlveolarTrauma,
        Parameter::SoftTissueInjuries,
        Parameter::PostOpInfectionsBleeding,
        Parameter::Tf,
        Parameter::Gic,
        Parameter::Composite,
        Parameter::Scaling,
        Parameter::Opmd,
        Parameter::MinorOralSurgery,
        Parameter::Referrals,
        Parameter::Others,
        Parameter::TotalAttendance,
        Parameter::PregnantMothers,
        Parameter::AgeUnder3,
        Parameter::Age13To19,
        Parameter::InwardPatients,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn row(self) -> u32 {
        FIRST_PARAM_ROW + self as u32
    }

    /// Row label printed in column A.
    pub const fn label(self) -> &'static str {
        match self {
            Parameter::Extractions => "Extractions",
            Parameter::OroFacialPainRelief => "Oro-Facial pain relief",
            Parameter::DentoAlveolarTrauma => "Dento-alveolar trauma",
            Parameter::SoftTissueInjuries => "Soft tissue injuries",
            Parameter::PostOpInfectionsBleeding => "Post Op Infections/bleeding",
            Parameter::Tf => "TF",
            Parameter::Gic => "GIC",
            Parameter::Composite => "Composite",
            Parameter::Scaling => "Scaling",
            Parameter::Opmd => "OPMD",
            Parameter::MinorOralSurgery => "Minor Oral Surgery",
            Parameter::Referrals => "Referrals",
            Parameter::Others => "Others",
            Parameter::TotalAttendance => "Total attendance",
            Parameter::PregnantMothers => "Pregnant Mothers",
            Parameter::AgeUnder3 => "Age under 3",
            Parameter::Age13To19 => "Age 13-19",
            Parameter::InwardPatients => "Inward Patients",
        }
    }

    /// Field name in a stored daily statistics record.
    pub const fn field(self) -> &'static str {
        match self {
            Parameter::Extractions => "extractions",
            Parameter::OroFacialPainRelief => "oro_facial_pain_relief",
            Parameter::DentoAlveolarTrauma => "dento_alveolar_trauma",
            Parameter::SoftTissueInjuries => "soft_tissue_injuries",
            Parameter::PostOpInfectionsBleeding => "post_op_infections_bleeding",
            Parameter::Tf => "tf",
            Parameter::Gic => "gic",
            Parameter::Composite => "composite",
            Parameter::Scaling => "scaling",
            Parameter::Opmd => "opmd",
            Parameter::MinorOralSurgery => "minor_oral_surgery",
            Parameter::Referrals => "referrals",
            Parameter::Others => "others",
            Parameter::TotalAttendance => "total_attendance",
            Parameter::PregnantMothers => "pregnant_mothers",
            Parameter::AgeUnder3 => "age_under_3",
            Parameter::Age13To19 => "age_13_19",
            Parameter::InwardPatients => "inward_patients",
        }
    }

    pub fn from_field(field: &str) -> Option<Parameter> {
        Parameter::ALL.into_iter().find(|p| p.field() == field)
    }
}
