use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::GeoPoint;
use crate::error::{
    invalid_transition_error, ride_in_progress_error, unauthorized_error, Error,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub status: Status,
    pub driver_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub base_amount: f64,
    pub final_amount: Option<f64>,
    pub fee_percentage: Option<f64>,
    pub driver_earnings: Option<f64>,
    pub allow_external_drivers: bool,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Started,
    Completed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    MotoTaxi,
    Car,
}

/// Creation parameters. This is the only place `allow_external_drivers` can
/// be set; update payloads never carry it.
#[derive(Clone, Debug, Deserialize)]
pub struct CreateRide {
    pub passenger_id: Uuid,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub service_type: ServiceType,
    pub base_amount: f64,
    pub allow_external_drivers: bool,
}

impl Ride {
    pub fn new(params: CreateRide) -> Self {
        Self {
            id: Uuid::new_v4(),
            passenger_id: params.passenger_id,
            pickup: params.pickup,
            destination: params.destination,
            status: Status::Pending,
            driver_id: None,
            service_type: params.service_type,
            base_amount: params.base_amount,
            final_amount: None,
            fee_percentage: None,
            driver_earnings: None,
            allow_external_drivers: params.allow_external_drivers,
            cancel_reason: None,
            created_at: Utc::now(),
        }
    }

    fn ensure_assigned(&self, driver_id: Uuid) -> Result<(), Error> {
        if self.driver_id != Some(driver_id) {
            return Err(unauthorized_error());
        }

        Ok(())
    }

    pub fn accept(&mut self, driver_id: Uuid) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.status = Status::Accepted;
                self.driver_id = Some(driver_id);
                Ok(())
            }
            _ => Err(invalid_transition_error()),
        }
    }

    pub fn start(&mut self, driver_id: Uuid) -> Result<(), Error> {
        match self.status {
            Status::Accepted => {
                self.ensure_assigned(driver_id)?;
                self.status = Status::Started;
                Ok(())
            }
            _ => Err(invalid_transition_error()),
        }
    }

    /// Settlement figures come from the fee calculator; once written they are
    /// never mutated again.
    pub fn complete(
        &mut self,
        driver_id: Uuid,
        final_amount: f64,
        fee_percentage: f64,
        driver_earnings: f64,
    ) -> Result<(), Error> {
        match self.status {
            Status::Started => {
                self.ensure_assigned(driver_id)?;
                self.status = Status::Completed;
                self.final_amount = Some(final_amount);
                self.fee_percentage = Some(fee_percentage);
                self.driver_earnings = Some(driver_earnings);
                Ok(())
            }
            _ => Err(invalid_transition_error()),
        }
    }

    pub fn cancel(&mut self, actor_id: Uuid, reason: &str) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                if actor_id != self.passenger_id {
                    return Err(unauthorized_error());
                }
            }
            Status::Accepted => {
                if actor_id != self.passenger_id && self.driver_id != Some(actor_id) {
                    return Err(unauthorized_error());
                }
            }
            Status::Started => return Err(ride_in_progress_error()),
            _ => return Err(invalid_transition_error()),
        }

        self.status = Status::Cancelled;
        self.cancel_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
fn test_ride() -> Ride {
    Ride::new(CreateRide {
        passenger_id: Uuid::new_v4(),
        pickup: GeoPoint::new(-23.5510, -46.6338).unwrap(),
        destination: GeoPoint::new(-23.5610, -46.6438).unwrap(),
        service_type: ServiceType::MotoTaxi,
        base_amount: 12.0,
        allow_external_drivers: true,
    })
}

#[test]
fn lifecycle_happy_path() {
    let mut ride = test_ride();
    let driver = Uuid::new_v4();

    ride.accept(driver).unwrap();
    assert_eq!(ride.status, Status::Accepted);
    assert_eq!(ride.driver_id, Some(driver));

    ride.start(driver).unwrap();
    assert_eq!(ride.status, Status::Started);

    ride.complete(driver, 15.0, 7.0, 13.95).unwrap();
    assert_eq!(ride.status, Status::Completed);
    assert_eq!(ride.final_amount, Some(15.0));
    assert_eq!(ride.fee_percentage, Some(7.0));
    assert_eq!(ride.driver_earnings, Some(13.95));
}

#[test]
fn transitions_from_wrong_state_fail_without_side_effects() {
    use crate::error::{INVALID_TRANSITION_CODE, RIDE_IN_PROGRESS_CODE};

    let mut ride = test_ride();
    let driver = Uuid::new_v4();

    assert_eq!(
        ride.start(driver).unwrap_err().code,
        INVALID_TRANSITION_CODE
    );
    assert_eq!(
        ride.complete(driver, 10.0, 7.0, 9.3).unwrap_err().code,
        INVALID_TRANSITION_CODE
    );
    assert_eq!(ride.status, Status::Pending);
    assert_eq!(ride.driver_id, None);

    ride.accept(driver).unwrap();
    assert_eq!(
        ride.accept(Uuid::new_v4()).unwrap_err().code,
        INVALID_TRANSITION_CODE
    );
    assert_eq!(ride.driver_id, Some(driver));

    ride.start(driver).unwrap();
    let err = ride.cancel(ride.passenger_id, "changed plans").unwrap_err();
    assert_eq!(err.code, RIDE_IN_PROGRESS_CODE);
    assert_eq!(ride.status, Status::Started);
    assert_eq!(ride.cancel_reason, None);
}

#[test]
fn only_the_assigned_driver_may_start_and_complete() {
    use crate::error::UNAUTHORIZED_CODE;

    let mut ride = test_ride();
    let driver = Uuid::new_v4();
    let other = Uuid::new_v4();

    ride.accept(driver).unwrap();
    assert_eq!(ride.start(other).unwrap_err().code, UNAUTHORIZED_CODE);
    assert_eq!(ride.status, Status::Accepted);

    ride.start(driver).unwrap();
    assert_eq!(
        ride.complete(other, 10.0, 20.0, 8.0).unwrap_err().code,
        UNAUTHORIZED_CODE
    );
    assert_eq!(ride.status, Status::Started);
}

#[test]
fn cancellation_actor_rules() {
    use crate::error::UNAUTHORIZED_CODE;

    // pending: passenger only
    let mut ride = test_ride();
    let driver = Uuid::new_v4();
    assert_eq!(
        ride.cancel(driver, "not mine").unwrap_err().code,
        UNAUTHORIZED_CODE
    );
    ride.cancel(ride.passenger_id, "waited too long").unwrap();
    assert_eq!(ride.status, Status::Cancelled);
    assert_eq!(ride.cancel_reason.as_deref(), Some("waited too long"));

    // accepted: assigned driver may also cancel
    let mut ride = test_ride();
    ride.accept(driver).unwrap();
    ride.cancel(driver, "flat tire").unwrap();
    assert_eq!(ride.status, Status::Cancelled);
}
