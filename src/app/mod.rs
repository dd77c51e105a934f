//! Application state store.
//!
//! Holds what the screens would show: current view and role, profile fields,
//! the trip being requested and the active trip. All changes go through
//! [`Mutation`]s so voice dispatch and manual host commands share one path.

pub mod context;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::geo;

pub use context::DispatchContext;

/// A point in raw latitude/longitude degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

/// A resolved location with a human-readable address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub coord: Coordinate,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Home,
    PassengerRegistration,
    DriverRegistration,
    PassengerDashboard,
    DriverDashboard,
}

impl View {
    pub fn is_registration(self) -> bool {
        matches!(self, Self::PassengerRegistration | Self::DriverRegistration)
    }

    pub fn is_dashboard(self) -> bool {
        matches!(self, Self::PassengerDashboard | Self::DriverDashboard)
    }

    /// Registration screen for `role`; `None` for no role.
    pub fn registration_for(role: Role) -> Option<Self> {
        match role {
            Role::Passenger => Some(Self::PassengerRegistration),
            Role::Driver => Some(Self::DriverRegistration),
            Role::None => None,
        }
    }

    /// Dashboard screen for `role`; `None` for no role.
    pub fn dashboard_for(role: Role) -> Option<Self> {
        match role {
            Role::Passenger => Some(Self::PassengerDashboard),
            Role::Driver => Some(Self::DriverDashboard),
            Role::None => None,
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Home => write!(f, "home"),
            Self::PassengerRegistration => write!(f, "passenger_registration"),
            Self::DriverRegistration => write!(f, "driver_registration"),
            Self::PassengerDashboard => write!(f, "passenger_dashboard"),
            Self::DriverDashboard => write!(f, "driver_dashboard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    None,
    Passenger,
    Driver,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Passenger => write!(f, "passenger"),
            Self::Driver => write!(f, "driver"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassengerProfile {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverProfile {
    pub name: String,
    pub phone: String,
    pub plate: String,
}

/// The trip being put together before it is requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TripRequest {
    pub pickup: Option<Place>,
    pub destination: Option<Place>,
    pub distance_km: Option<f64>,
    pub price: Option<u64>,
}

impl TripRequest {
    pub fn is_empty(&self) -> bool {
        self.pickup.is_none() && self.destination.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Searching,
    Accepted,
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Searching => write!(f, "searching"),
            Self::Accepted => write!(f, "accepted"),
        }
    }
}

/// Contact details of the other party on a trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counterpart {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveTrip {
    pub id: String,
    pub pickup: Place,
    pub destination: Place,
    pub distance_km: Option<f64>,
    pub price: Option<u64>,
    pub status: TripStatus,
    pub counterpart: Option<Counterpart>,
    /// Live driver position. Written only by the simulation engine once accepted.
    pub driver_position: Option<Coordinate>,
    pub driver_arrived: bool,
    pub requested_at: DateTime<Utc>,
}

/// Every state change the dispatch table or a host command can make.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    SetRole(Role),
    SetView(View),
    SetPassengerName(String),
    SetPassengerPhone(String),
    SetDriverName(String),
    SetDriverPhone(String),
    SetDriverPlate(String),
    /// Look up a destination from free text.
    ResolveDestination { hint: String },
    RequestTrip,
    CancelTrip,
    ClearTripRequest,
}

/// Asynchronous work a mutation kicked off.
#[derive(Debug, Clone, PartialEq)]
pub enum Followup {
    ResolveDestination { hint: String },
    MatchTrip { trip_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppState {
    pub view: View,
    pub role: Role,
    pub passenger: PassengerProfile,
    pub driver: DriverProfile,
    pub current_location: Coordinate,
    pub trip_request: TripRequest,
    pub active_trip: Option<ActiveTrip>,
}

impl AppState {
    pub fn new(current_location: Coordinate) -> Self {
        Self {
            view: View::Home,
            role: Role::None,
            passenger: PassengerProfile::default(),
            driver: DriverProfile::default(),
            current_location,
            trip_request: TripRequest::default(),
            active_trip: None,
        }
    }

    /// Immutable copy of what dispatch rules read.
    pub fn snapshot(&self) -> DispatchContext {
        DispatchContext {
            view: self.view,
            role: self.role,
            trip_request: self.trip_request.clone(),
            active_trip: self.active_trip.clone(),
        }
    }

    /// Apply one mutation. Returns follow-up work for the runtime, if any.
    pub fn apply(&mut self, mutation: Mutation) -> Option<Followup> {
        debug!(?mutation, "Applying mutation");
        match mutation {
            Mutation::SetRole(role) => self.role = role,
            Mutation::SetView(view) => self.view = view,
            Mutation::SetPassengerName(name) => self.passenger.name = name,
            Mutation::SetPassengerPhone(phone) => self.passenger.phone = phone,
            Mutation::SetDriverName(name) => self.driver.name = name,
            Mutation::SetDriverPhone(phone) => self.driver.phone = phone,
            Mutation::SetDriverPlate(plate) => self.driver.plate = plate,
            Mutation::ResolveDestination { hint } => {
                return Some(Followup::ResolveDestination { hint });
            }
            Mutation::RequestTrip => return self.request_trip(),
            Mutation::CancelTrip => {
                if let Some(trip) = self.active_trip.take() {
                    info!(trip_id = %trip.id, status = %trip.status, "Trip cancelled");
                }
                self.trip_request = TripRequest::default();
            }
            Mutation::ClearTripRequest => self.trip_request = TripRequest::default(),
        }
        None
    }

    fn request_trip(&mut self) -> Option<Followup> {
        if let Some(trip) = &self.active_trip {
            warn!(trip_id = %trip.id, "Trip already active, ignoring request");
            return None;
        }
        let Some(destination) = self.trip_request.destination.clone() else {
            warn!("No destination resolved, ignoring trip request");
            return None;
        };
        let pickup = self.trip_request.pickup.clone().unwrap_or_else(|| Place {
            coord: self.current_location,
            address: self.current_location.to_string(),
        });
        let id = uuid::Uuid::new_v4().to_string();
        info!(trip_id = %id, destination = %destination.address, "Trip requested");
        self.active_trip = Some(ActiveTrip {
            id: id.clone(),
            pickup,
            destination,
            distance_km: self.trip_request.distance_km,
            price: self.trip_request.price,
            status: TripStatus::Searching,
            counterpart: None,
            driver_position: None,
            driver_arrived: false,
            requested_at: Utc::now(),
        });
        Some(Followup::MatchTrip { trip_id: id })
    }

    /// Fill in the trip request once a destination has been geocoded.
    pub fn set_destination(&mut self, pickup: Place, destination: Place) {
        let distance = geo::distance_km(
            pickup.coord.lat,
            pickup.coord.lng,
            destination.coord.lat,
            destination.coord.lng,
        );
        info!(
            destination = %destination.address,
            distance_km = format!("{:.2}", distance),
            "Destination resolved"
        );
        self.trip_request = TripRequest {
            pickup: Some(pickup),
            destination: Some(destination),
            distance_km: Some(distance),
            price: Some(geo::price(distance)),
        };
    }

    /// Mark a searching trip as accepted by `driver`, who starts at
    /// `pickup + offset`. Returns false if the trip is gone or already matched.
    pub fn accept_trip(&mut self, trip_id: &str, driver: Counterpart, offset: Coordinate) -> bool {
        match self.active_trip.as_mut() {
            Some(trip) if trip.id == trip_id && trip.status == TripStatus::Searching => {
                trip.status = TripStatus::Accepted;
                trip.driver_position = Some(Coordinate::new(
                    trip.pickup.coord.lat + offset.lat,
                    trip.pickup.coord.lng + offset.lng,
                ));
                info!(trip_id, driver = %driver.name, "Trip accepted");
                trip.counterpart = Some(driver);
                true
            }
            _ => {
                debug!(trip_id, "Match for a trip that is no longer searching");
                false
            }
        }
    }

    /// Clear the active trip and request after arrival.
    pub fn complete_trip(&mut self) {
        if let Some(trip) = self.active_trip.take() {
            info!(trip_id = %trip.id, "Trip completed");
        }
        self.trip_request = TripRequest::default();
    }

    /// Current driver position and pickup target while the simulation should run.
    pub fn simulation_target(&self) -> Option<(Coordinate, Coordinate)> {
        if self.role != Role::Passenger {
            return None;
        }
        let trip = self.active_trip.as_ref()?;
        if trip.status != TripStatus::Accepted || trip.driver_arrived {
            return None;
        }
        Some((trip.driver_position?, trip.pickup.coord))
    }

    /// Write a new simulated driver position.
    pub fn set_driver_position(&mut self, position: Coordinate, arrived: bool) {
        if let Some(trip) = self.active_trip.as_mut() {
            trip.driver_position = Some(position);
            trip.driver_arrived = arrived;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bogota() -> Coordinate {
        Coordinate::new(4.60, -74.08)
    }

    fn place(lat: f64, lng: f64, address: &str) -> Place {
        Place {
            coord: Coordinate::new(lat, lng),
            address: address.into(),
        }
    }

    fn driver() -> Counterpart {
        Counterpart {
            name: "Carlos".into(),
            phone: "3001234567".into(),
            plate: Some("ABC123".into()),
        }
    }

    fn with_destination() -> AppState {
        let mut state = AppState::new(bogota());
        state.role = Role::Passenger;
        state.view = View::PassengerDashboard;
        state.set_destination(
            place(4.60, -74.08, "Calle 26"),
            place(4.65, -74.10, "Usaquén"),
        );
        state
    }

    #[test]
    fn test_set_destination_prices_trip() {
        let state = with_destination();
        let request = &state.trip_request;
        assert!(request.distance_km.unwrap() > 5.0);
        assert_eq!(request.price, Some(geo::price(request.distance_km.unwrap())));
    }

    #[test]
    fn test_request_trip_starts_searching() {
        let mut state = with_destination();
        let followup = state.apply(Mutation::RequestTrip);
        let trip = state.active_trip.as_ref().unwrap();
        assert_eq!(trip.status, TripStatus::Searching);
        assert_eq!(trip.destination.address, "Usaquén");
        assert_eq!(
            followup,
            Some(Followup::MatchTrip {
                trip_id: trip.id.clone()
            })
        );
    }

    #[test]
    fn test_second_request_is_ignored() {
        let mut state = with_destination();
        state.apply(Mutation::RequestTrip);
        let id = state.active_trip.as_ref().unwrap().id.clone();
        assert_eq!(state.apply(Mutation::RequestTrip), None);
        assert_eq!(state.active_trip.as_ref().unwrap().id, id);
    }

    #[test]
    fn test_request_without_destination_is_ignored() {
        let mut state = AppState::new(bogota());
        assert_eq!(state.apply(Mutation::RequestTrip), None);
        assert!(state.active_trip.is_none());
    }

    #[test]
    fn test_accept_places_driver_and_starts_simulation() {
        let mut state = with_destination();
        state.apply(Mutation::RequestTrip);
        let id = state.active_trip.as_ref().unwrap().id.clone();
        assert!(state.simulation_target().is_none());

        assert!(state.accept_trip(&id, driver(), Coordinate::new(0.005, 0.005)));
        let (from, to) = state.simulation_target().unwrap();
        assert_eq!(to, bogota());
        assert!((from.lat - 4.605).abs() < 1e-9);
        assert!((from.lng + 74.075).abs() < 1e-9);

        // Matching twice is a no-op.
        assert!(!state.accept_trip(&id, driver(), Coordinate::new(0.0, 0.0)));
    }

    #[test]
    fn test_simulation_requires_passenger_role() {
        let mut state = with_destination();
        state.apply(Mutation::RequestTrip);
        let id = state.active_trip.as_ref().unwrap().id.clone();
        state.accept_trip(&id, driver(), Coordinate::new(0.005, 0.005));
        state.role = Role::Driver;
        assert!(state.simulation_target().is_none());
    }

    #[test]
    fn test_cancel_resets_request() {
        let mut state = with_destination();
        state.apply(Mutation::RequestTrip);
        let id = state.active_trip.as_ref().unwrap().id.clone();
        state.apply(Mutation::CancelTrip);
        assert!(state.active_trip.is_none());
        assert!(state.trip_request.is_empty());
        assert!(!state.accept_trip(&id, driver(), Coordinate::new(0.0, 0.0)));
    }

    #[test]
    fn test_complete_trip_resets_everything() {
        let mut state = with_destination();
        state.apply(Mutation::RequestTrip);
        state.complete_trip();
        assert!(state.active_trip.is_none());
        assert_eq!(state.trip_request, TripRequest::default());
    }

    #[test]
    fn test_arrival_stops_simulation() {
        let mut state = with_destination();
        state.apply(Mutation::RequestTrip);
        let id = state.active_trip.as_ref().unwrap().id.clone();
        state.accept_trip(&id, driver(), Coordinate::new(0.005, 0.005));
        state.set_driver_position(bogota(), true);
        assert!(state.simulation_target().is_none());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let state = AppState::new(bogota());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["view"], "home");
        assert_eq!(json["role"], "none");
        assert!(json["active_trip"].is_null());
    }
}
