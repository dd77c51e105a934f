//! Action dispatch table.
//!
//! Pure mapping from an [`Intent`] and the [`DispatchContext`] it was spoken
//! against to the state mutations it causes. The intent's speech is always
//! returned as the prompt, even when a guard drops the action.

use tracing::debug;

use crate::app::{DispatchContext, Mutation, Role, View};
use crate::intent::{ActionKind, Intent};

/// Result of dispatching one intent.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub mutations: Vec<Mutation>,
    pub prompt: String,
    /// The action's context guard failed and it was dropped.
    pub guard_missed: bool,
}

pub fn dispatch(intent: &Intent, ctx: &DispatchContext) -> DispatchOutcome {
    let mutations = match intent.action {
        ActionKind::NavigatePassengerReg => register(Role::Passenger),
        ActionKind::NavigateDriverReg => register(Role::Driver),
        ActionKind::SetPassengerName => set_name(ctx, Role::Passenger, &intent.value),
        ActionKind::SetDriverName => set_name(ctx, Role::Driver, &intent.value),
        ActionKind::SetPassengerPhone => {
            Some(vec![Mutation::SetPassengerPhone(digits_only(&intent.value))])
        }
        ActionKind::SetDriverPhone => {
            Some(vec![Mutation::SetDriverPhone(digits_only(&intent.value))])
        }
        ActionKind::SetDriverPlate => Some(vec![Mutation::SetDriverPlate(normalize_plate(
            &intent.value,
        ))]),
        ActionKind::NavigateDestination => Some(navigate_destination(ctx, &intent.value)),
        ActionKind::ConfirmTrip => {
            if ctx.view == View::PassengerDashboard && ctx.has_destination() {
                Some(vec![Mutation::RequestTrip])
            } else {
                None
            }
        }
        ActionKind::Cancel => Some(go_back(ctx)),
        ActionKind::None => Some(Vec::new()),
    };

    let guard_missed = mutations.is_none();
    if guard_missed {
        debug!(action = %intent.action, view = %ctx.view, "Dispatch guard missed, dropping action");
    }
    DispatchOutcome {
        mutations: mutations.unwrap_or_default(),
        prompt: intent.speech.clone(),
        guard_missed,
    }
}

/// Context-sensitive "go back", shared by the CANCEL action and the manual
/// back command.
pub fn go_back(ctx: &DispatchContext) -> Vec<Mutation> {
    if ctx.active_trip.is_some() {
        let mut mutations = vec![Mutation::CancelTrip];
        match View::dashboard_for(ctx.role) {
            Some(dashboard) if ctx.view != dashboard => {
                mutations.push(Mutation::SetView(dashboard));
            }
            _ => {}
        }
        return mutations;
    }
    if ctx.view == View::PassengerDashboard && !ctx.trip_request.is_empty() {
        return vec![Mutation::ClearTripRequest];
    }
    if ctx.view.is_registration() || ctx.view.is_dashboard() {
        return vec![Mutation::SetView(View::Home), Mutation::SetRole(Role::None)];
    }
    Vec::new()
}

fn register(role: Role) -> Option<Vec<Mutation>> {
    let view = View::registration_for(role)?;
    Some(vec![Mutation::SetRole(role), Mutation::SetView(view)])
}

fn set_name(ctx: &DispatchContext, role: Role, value: &str) -> Option<Vec<Mutation>> {
    let registration = View::registration_for(role)?;
    let name = value.trim().to_string();
    let set = match role {
        Role::Driver => Mutation::SetDriverName(name),
        _ => Mutation::SetPassengerName(name),
    };
    if ctx.view == registration {
        Some(vec![set])
    } else if ctx.view == View::Home {
        Some(vec![
            Mutation::SetRole(role),
            Mutation::SetView(registration),
            set,
        ])
    } else {
        None
    }
}

fn navigate_destination(ctx: &DispatchContext, hint: &str) -> Vec<Mutation> {
    let mut mutations = Vec::new();
    if ctx.view.is_registration() {
        let role = match ctx.view {
            View::DriverRegistration => Role::Driver,
            _ => Role::Passenger,
        };
        if let Some(dashboard) = View::dashboard_for(role) {
            mutations.push(Mutation::SetView(dashboard));
        }
    }
    mutations.push(Mutation::ResolveDestination {
        hint: hint.trim().to_string(),
    });
    mutations
}

/// Keep only ASCII digits ("310 555 9999" -> "3105559999").
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Keep only alphanumerics, uppercased ("x y z 555" -> "XYZ555").
pub fn normalize_plate(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
