use serde::{Deserialize, Serialize};

/// Merged result of every configured detector for one image.
///
/// Fields not reported by any detector keep their zero value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_blank: bool,
    pub is_folded: bool,
    pub tilt_angle: f64,
}

/// One field reported by a detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutcomeField {
    IsBlank(bool),
    IsFolded(bool),
    TiltAngle(f64),
}

impl OutcomeField {
    pub fn name(&self) -> &'static str {
        match self {
            OutcomeField::IsBlank(_) => "is_blank",
            OutcomeField::IsFolded(_) => "is_folded",
            OutcomeField::TiltAngle(_) => "tilt_angle",
        }
    }
}

/// The subset of outcome fields a single detector reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialOutcome {
    fields: Vec<OutcomeField>,
}

impl PartialOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: OutcomeField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn set(&mut self, field: OutcomeField) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[OutcomeField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl ValidationOutcome {
    /// Overwrite every field present in `partial`. Within one partial, and
    /// across successive calls, the last write to a field wins.
    pub fn apply(&mut self, partial: &PartialOutcome) {
        for field in partial.fields() {
            match *field {
                OutcomeField::IsBlank(v) => self.is_blank = v,
                OutcomeField::IsFolded(v) => self.is_folded = v,
                OutcomeField::TiltAngle(v) => self.tilt_angle = v,
            }
        }
    }
}
