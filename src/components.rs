use poise::serenity_prelude as serenity;

pub const REQUEST_LOAN: &str = "request-loan";
pub const APPROVE_REPAYMENT: &str = "approve-repayment";

/// What a button click refers to, decoded from the component custom id.
///
/// Ids have the form `<action>:<target>`, so clicks on one offer never resolve
/// against another offer that shares the same action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    RequestLoan { offer_id: String },
    ApproveRepayment { loan_id: String },
}

impl ButtonAction {
    pub fn custom_id(&self) -> String {
        match self {
            ButtonAction::RequestLoan { offer_id } => format!("{}:{}", REQUEST_LOAN, offer_id),
            ButtonAction::ApproveRepayment { loan_id } => {
                format!("{}:{}", APPROVE_REPAYMENT, loan_id)
            }
        }
    }

    pub fn parse(custom_id: &str) -> Option<Self> {
        let (action, target) = custom_id.split_once(':')?;
        if target.is_empty() {
            return None;
        }

        match action {
            REQUEST_LOAN => Some(ButtonAction::RequestLoan {
                offer_id: target.to_string(),
            }),
            APPROVE_REPAYMENT => Some(ButtonAction::ApproveRepayment {
                loan_id: target.to_string(),
            }),
            _ => None,
        }
    }
}

/// A single button as the bot renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSpec {
    pub action: ButtonAction,
    pub label: String,
    pub style: serenity::ButtonStyle,
    pub disabled: bool,
}

impl ButtonSpec {
    pub fn new(action: ButtonAction, label: impl Into<String>, style: serenity::ButtonStyle) -> Self {
        ButtonSpec {
            action,
            label: label.into(),
            style,
            disabled: false,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn to_row(&self) -> serenity::CreateActionRow {
        let button = serenity::CreateButton::new(self.action.custom_id())
            .label(self.label.clone())
            .style(self.style)
            .disabled(self.disabled);
        serenity::CreateActionRow::Buttons(vec![button])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_ids_are_scoped_by_target() {
        let a = ButtonAction::RequestLoan { offer_id: "a".into() };
        let b = ButtonAction::RequestLoan { offer_id: "b".into() };

        assert_eq!(a.custom_id(), "request-loan:a");
        assert_ne!(a.custom_id(), b.custom_id());
        assert_eq!(ButtonAction::parse("request-loan:a"), Some(a));
    }

    #[test]
    fn repayment_ids_parse() {
        assert_eq!(
            ButtonAction::parse("approve-repayment:loan-1"),
            Some(ButtonAction::ApproveRepayment { loan_id: "loan-1".into() })
        );
    }

    #[test]
    fn unknown_or_unscoped_ids_are_ignored() {
        assert_eq!(ButtonAction::parse("request-loan"), None);
        assert_eq!(ButtonAction::parse("request-loan:"), None);
        assert_eq!(ButtonAction::parse("something-else:1"), None);
        assert_eq!(ButtonAction::parse(""), None);
    }

    #[test]
    fn disabled_builder_keeps_action() {
        let spec = ButtonSpec::new(
            ButtonAction::RequestLoan { offer_id: "x".into() },
            "ขอกู้เงิน",
            serenity::ButtonStyle::Primary,
        )
        .disabled();

        assert!(spec.disabled);
        assert_eq!(spec.action.custom_id(), "request-loan:x");
    }
}
