use chrono::{DateTime, Utc};

use crate::engine::sequencer;
use crate::error::AppError;
use crate::models::{Point, Trip, TripStatus, TripStop};

/// Parameters needed to re-measure a trip after its stops change.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext {
    pub base: Point,
    pub speed_kmh: f64,
    pub service_time: chrono::Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub order_id: u64,
    /// False when the stop had already been delivered.
    pub newly_delivered: bool,
    pub trip_finished: bool,
}

#[derive(Debug, Clone)]
pub struct Removal {
    pub stop: TripStop,
    pub trip_finished: bool,
}

fn ensure_open(trip: &Trip) -> Result<(), AppError> {
    if trip.status == TripStatus::Finished {
        return Err(AppError::Conflict(format!("trip {} is already finished", trip.id)));
    }
    Ok(())
}

/// Moves the stop at `seq` to position `to_seq`, shifting the stops in
/// between by one.
pub fn move_stop(
    trip: &mut Trip,
    seq: u32,
    to_seq: u32,
    ctx: &RouteContext,
) -> Result<(), AppError> {
    ensure_open(trip)?;

    let len = trip.stops.len() as u32;
    if to_seq < 1 || to_seq > len {
        return Err(AppError::InvalidSequence(format!(
            "target seq {to_seq} outside 1..={len} for trip {}",
            trip.id
        )));
    }

    let from = trip.stop_index(seq)?;
    let stop = trip.stops.remove(from);
    trip.stops.insert(to_seq as usize - 1, stop);
    trip.renumber();
    remeasure(trip, ctx)?;

    Ok(())
}

/// Marks one stop delivered. Re-marking is a no-op.
pub fn mark_delivered(trip: &mut Trip, seq: u32, now: DateTime<Utc>) -> Result<Delivery, AppError> {
    let idx = trip.stop_index(seq)?;
    let order_id = trip.stops[idx].order_id;

    if trip.stops[idx].delivered {
        return Ok(Delivery {
            order_id,
            newly_delivered: false,
            trip_finished: false,
        });
    }

    ensure_open(trip)?;
    if trip.status == TripStatus::Planned {
        trip.transition_to(TripStatus::InProgress)?;
    }

    trip.stops[idx].delivered = true;

    let trip_finished = trip.all_delivered();
    if trip_finished {
        finish(trip, now)?;
    }

    Ok(Delivery {
        order_id,
        newly_delivered: true,
        trip_finished,
    })
}

/// Removes an undelivered stop and re-measures the remaining route. A trip
/// left with nothing to deliver is finished.
pub fn delete_stop(
    trip: &mut Trip,
    seq: u32,
    ctx: &RouteContext,
    now: DateTime<Utc>,
) -> Result<Removal, AppError> {
    ensure_open(trip)?;

    let idx = trip.stop_index(seq)?;
    if trip.stops[idx].delivered {
        return Err(AppError::Conflict(format!(
            "stop {seq} of trip {} is delivered and cannot be deleted",
            trip.id
        )));
    }

    let stop = trip.stops.remove(idx);
    trip.renumber();
    remeasure(trip, ctx)?;

    let trip_finished = trip.all_delivered();
    if trip_finished {
        finish(trip, now)?;
    }

    Ok(Removal {
        stop,
        trip_finished,
    })
}

/// Recomputes totals and estimates along the current stop order.
pub fn remeasure(trip: &mut Trip, ctx: &RouteContext) -> Result<(), AppError> {
    let route = sequencer::measure(
        trip.origin,
        ctx.base,
        trip.stops.iter().map(|stop| (stop.order_id, stop.point())),
    );
    let times = sequencer::schedule(&route, trip.start_at, ctx.speed_kmh, ctx.service_time)?;

    for (stop, at) in trip.stops.iter_mut().zip(times.stops.iter()) {
        stop.estimated_arrival_at = Some(at.arrival);
        stop.estimated_departure_at = Some(at.departure);
    }

    trip.total_weight = trip.stops.iter().map(|stop| stop.weight_kg).sum();
    trip.total_distance_km = route.total_distance_km;
    trip.estimated_finish_at = if trip.stops.is_empty() {
        None
    } else {
        Some(times.finish_at)
    };
    Ok(())
}

fn finish(trip: &mut Trip, now: DateTime<Utc>) -> Result<(), AppError> {
    trip.transition_to(TripStatus::Finished)?;
    trip.finish_at = Some(now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{delete_stop, mark_delivered, move_stop, RouteContext};
    use crate::error::AppError;
    use crate::models::{Point, Trip, TripStatus, TripStop};

    fn ctx() -> RouteContext {
        RouteContext {
            base: Point::new(0.0, 0.0),
            speed_kmh: 40.0,
            service_time: chrono::Duration::zero(),
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn stop(seq: u32, x: f64, y: f64) -> TripStop {
        TripStop {
            id: 100 + u64::from(seq),
            trip_id: 1,
            order_id: u64::from(seq),
            seq,
            x,
            y,
            weight_kg: 2.0,
            estimated_arrival_at: None,
            estimated_departure_at: None,
            delivered: false,
        }
    }

    fn trip(stops: Vec<TripStop>) -> Trip {
        Trip {
            id: 1,
            drone_id: 1,
            origin: Point::new(0.0, 0.0),
            total_weight: 2.0 * stops.len() as f64,
            total_distance_km: 0.0,
            start_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            estimated_finish_at: None,
            finish_at: None,
            status: TripStatus::Planned,
            stops,
        }
    }

    fn order_ids(trip: &Trip) -> Vec<u64> {
        trip.stops.iter().map(|s| s.order_id).collect()
    }

    fn seqs(trip: &Trip) -> Vec<u32> {
        trip.stops.iter().map(|s| s.seq).collect()
    }

    #[test]
    fn move_forward_shifts_intermediate_stops_back() {
        let mut t = trip(vec![stop(1, 1.0, 0.0), stop(2, 2.0, 0.0), stop(3, 3.0, 0.0), stop(4, 4.0, 0.0)]);

        move_stop(&mut t, 1, 3, &ctx()).unwrap();

        assert_eq!(order_ids(&t), vec![2, 3, 1, 4]);
        assert_eq!(seqs(&t), vec![1, 2, 3, 4]);
    }

    #[test]
    fn move_backward_shifts_intermediate_stops_forward() {
        let mut t = trip(vec![stop(1, 1.0, 0.0), stop(2, 2.0, 0.0), stop(3, 3.0, 0.0)]);

        move_stop(&mut t, 3, 1, &ctx()).unwrap();

        assert_eq!(order_ids(&t), vec![3, 1, 2]);
        assert_eq!(seqs(&t), vec![1, 2, 3]);
    }

    #[test]
    fn move_remeasures_the_route() {
        let mut t = trip(vec![stop(1, 3.0, 4.0), stop(2, 6.0, 8.0)]);

        move_stop(&mut t, 2, 1, &ctx()).unwrap();

        // (0,0) -> (6,8) -> (3,4) -> (0,0)
        assert!((t.total_distance_km - 20.0).abs() < 1e-9);
        assert_eq!(
            t.stops[0].estimated_arrival_at,
            Some(t.start_at + chrono::Duration::seconds(900))
        );
    }

    #[test]
    fn move_outside_range_is_invalid_sequence() {
        let mut t = trip(vec![stop(1, 1.0, 0.0), stop(2, 2.0, 0.0)]);

        assert!(matches!(move_stop(&mut t, 1, 0, &ctx()), Err(AppError::InvalidSequence(_))));
        assert!(matches!(move_stop(&mut t, 1, 3, &ctx()), Err(AppError::InvalidSequence(_))));
        assert_eq!(order_ids(&t), vec![1, 2]);
    }

    #[test]
    fn move_of_unknown_stop_is_not_found() {
        let mut t = trip(vec![stop(1, 1.0, 0.0)]);
        assert!(matches!(move_stop(&mut t, 5, 1, &ctx()), Err(AppError::NotFound(_))));
    }

    #[test]
    fn marking_every_stop_finishes_the_trip() {
        let mut t = trip(vec![stop(1, 1.0, 0.0), stop(2, 2.0, 0.0)]);

        let first = mark_delivered(&mut t, 1, now()).unwrap();
        assert!(first.newly_delivered);
        assert!(!first.trip_finished);
        assert_eq!(t.status, TripStatus::InProgress);

        let second = mark_delivered(&mut t, 2, now()).unwrap();
        assert!(second.trip_finished);
        assert_eq!(t.status, TripStatus::Finished);
        assert_eq!(t.finish_at, Some(now()));
    }

    #[test]
    fn re_marking_is_a_no_op() {
        let mut t = trip(vec![stop(1, 1.0, 0.0), stop(2, 2.0, 0.0)]);
        mark_delivered(&mut t, 1, now()).unwrap();

        let again = mark_delivered(&mut t, 1, now()).unwrap();

        assert!(!again.newly_delivered);
        assert!(!again.trip_finished);
        assert!(t.stops[0].delivered);
        assert_eq!(t.status, TripStatus::InProgress);
    }

    #[test]
    fn delivered_stop_cannot_be_deleted() {
        let mut t = trip(vec![stop(1, 1.0, 0.0), stop(2, 2.0, 0.0)]);
        mark_delivered(&mut t, 1, now()).unwrap();

        let err = delete_stop(&mut t, 1, &ctx(), now()).unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert!(t.stops[0].delivered);
    }

    #[test]
    fn delete_renumbers_and_recomputes_totals() {
        let mut t = trip(vec![stop(1, 3.0, 4.0), stop(2, 6.0, 8.0), stop(3, 0.0, 1.0)]);

        let removal = delete_stop(&mut t, 2, &ctx(), now()).unwrap();

        assert_eq!(removal.stop.order_id, 2);
        assert!(!removal.trip_finished);
        assert_eq!(order_ids(&t), vec![1, 3]);
        assert_eq!(seqs(&t), vec![1, 2]);
        assert!((t.total_weight - 4.0).abs() < 1e-9);
        // (0,0) -> (3,4) -> (0,1) -> (0,0)
        let expected = 5.0 + (9.0f64 + 9.0).sqrt() + 1.0;
        assert!((t.total_distance_km - expected).abs() < 1e-9);
    }

    #[test]
    fn deleting_the_only_stop_empties_and_finishes_the_trip() {
        let mut t = trip(vec![stop(1, 3.0, 4.0)]);

        let removal = delete_stop(&mut t, 1, &ctx(), now()).unwrap();

        assert!(removal.trip_finished);
        assert!(t.stops.is_empty());
        assert_eq!(t.total_weight, 0.0);
        assert_eq!(t.total_distance_km, 0.0);
        assert_eq!(t.status, TripStatus::Finished);
    }

    #[test]
    fn deleting_last_pending_stop_finishes_a_partly_delivered_trip() {
        let mut t = trip(vec![stop(1, 1.0, 0.0), stop(2, 2.0, 0.0)]);
        mark_delivered(&mut t, 1, now()).unwrap();

        let removal = delete_stop(&mut t, 2, &ctx(), now()).unwrap();

        assert!(removal.trip_finished);
        assert_eq!(t.status, TripStatus::Finished);
        assert!(t.stops[0].delivered);
    }

    #[test]
    fn finished_trip_rejects_changes() {
        let mut t = trip(vec![stop(1, 1.0, 0.0)]);
        mark_delivered(&mut t, 1, now()).unwrap();

        assert!(matches!(move_stop(&mut t, 1, 1, &ctx()), Err(AppError::Conflict(_))));
        assert!(mark_delivered(&mut t, 1, now()).is_ok());
    }
}
