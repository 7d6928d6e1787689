use crate::{MetadataPatch, OperationKind, OperationParams, ParamsError, SourceChoice};

#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub kind: OperationKind,
    pub params: OperationParams,
    pub source: SourceChoice,
}

impl PlanStep {
    pub fn new(kind: OperationKind, params: OperationParams, source: SourceChoice) -> Self {
        Self {
            kind,
            params,
            source,
        }
    }
}

/// Ordered operations submitted for one item. Execution stops at the first
/// failing step.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    pub fn single(kind: OperationKind, params: OperationParams) -> Self {
        Self {
            steps: vec![PlanStep::new(kind, params, SourceChoice::Default)],
        }
    }

    pub fn from_steps(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn first_kind(&self) -> Option<OperationKind> {
        self.steps.first().map(|step| step.kind)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        self.steps
            .iter()
            .try_for_each(|step| step.params.validate(step.kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroOperation {
    /// Upscale the original, cut out the background, then fit the canvas.
    PrintReady,
}

impl MacroOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            MacroOperation::PrintReady => "print-ready",
        }
    }

    pub fn plan(self, params: OperationParams) -> Plan {
        match self {
            MacroOperation::PrintReady => Plan::from_steps(vec![
                PlanStep::new(
                    OperationKind::Upscale,
                    params.clone(),
                    SourceChoice::Original,
                ),
                PlanStep::new(
                    OperationKind::RemoveBg,
                    OperationParams {
                        provider: params.provider.clone(),
                        ..OperationParams::default()
                    },
                    SourceChoice::PreviousOutput,
                ),
                PlanStep::new(
                    OperationKind::Scale,
                    OperationParams {
                        provider: params.provider,
                        ..OperationParams::default()
                    },
                    SourceChoice::PreviousOutput,
                ),
            ]),
        }
    }
}

/// Result of a successful step, as applied to the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutput {
    Image { url: String },
    Metadata(MetadataPatch),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_ready_chains_previous_outputs() {
        let plan = MacroOperation::PrintReady.plan(OperationParams::default());
        let shape: Vec<_> = plan
            .steps()
            .iter()
            .map(|step| (step.kind, step.source.clone()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (OperationKind::Upscale, SourceChoice::Original),
                (OperationKind::RemoveBg, SourceChoice::PreviousOutput),
                (OperationKind::Scale, SourceChoice::PreviousOutput),
            ]
        );
    }
}
