//! Dispatch context snapshot.

use std::collections::BTreeMap;

use super::{ActiveTrip, Role, TripRequest, View};

/// What the user was looking at when they started speaking.
///
/// Taken once when interpretation begins and passed by value through
/// interpretation and dispatch, so a view change mid-flight cannot alter how
/// the utterance is handled.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchContext {
    pub view: View,
    pub role: Role,
    pub trip_request: TripRequest,
    pub active_trip: Option<ActiveTrip>,
}

impl DispatchContext {
    pub fn has_destination(&self) -> bool {
        self.trip_request.destination.is_some()
    }

    /// Flat key/value form sent to the intent service.
    pub fn to_pairs(&self) -> BTreeMap<String, String> {
        let mut pairs = BTreeMap::new();
        pairs.insert("view".to_string(), self.view.to_string());
        pairs.insert("role".to_string(), self.role.to_string());
        pairs.insert(
            "hasDestination".to_string(),
            self.has_destination().to_string(),
        );
        if let Some(pickup) = &self.trip_request.pickup {
            pairs.insert("pickupAddress".to_string(), pickup.address.clone());
        }
        if let Some(destination) = &self.trip_request.destination {
            pairs.insert("destinationAddress".to_string(), destination.address.clone());
        }
        if let Some(price) = self.trip_request.price {
            pairs.insert("price".to_string(), price.to_string());
        }
        match &self.active_trip {
            Some(trip) => {
                pairs.insert("tripStatus".to_string(), trip.status.to_string());
                if let Some(counterpart) = &trip.counterpart {
                    pairs.insert("counterpartName".to_string(), counterpart.name.clone());
                }
            }
            None => {
                pairs.insert("tripStatus".to_string(), "none".to_string());
            }
        }
        pairs
    }
}
