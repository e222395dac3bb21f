use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::geo::{euclidean_km, travel_time};
use crate::models::{Order, Point};

/// One delivery point on a route, with the length of the leg that reaches it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStop {
    pub order_id: u64,
    pub point: Point,
    pub leg_km: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub stops: Vec<RouteStop>,
    pub return_leg_km: f64,
    pub total_distance_km: f64,
}

impl Route {
    pub fn empty() -> Self {
        Self {
            stops: Vec::new(),
            return_leg_km: 0.0,
            total_distance_km: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopTimes {
    pub arrival: DateTime<Utc>,
    pub departure: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub stops: Vec<StopTimes>,
    /// Arrival back at base.
    pub finish_at: DateTime<Utc>,
}

/// Orders a set of deliveries by nearest neighbour, starting at `origin` and
/// closing the loop at `base`. Equal distances go to the lower order id.
pub fn sequence(origin: Point, base: Point, orders: &[&Order]) -> Route {
    let mut remaining: Vec<&Order> = orders.to_vec();
    let mut waypoints = Vec::with_capacity(remaining.len());
    let mut cursor = origin;

    while !remaining.is_empty() {
        let nearest = remaining
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                euclidean_km(&cursor, &a.customer)
                    .total_cmp(&euclidean_km(&cursor, &b.customer))
                    .then(a.id.cmp(&b.id))
            })
            .map(|(idx, _)| idx);

        let Some(idx) = nearest else { break };
        let order = remaining.swap_remove(idx);
        waypoints.push((order.id, order.customer));
        cursor = order.customer;
    }

    measure(origin, base, waypoints)
}

/// Measures a route whose visiting order is already fixed.
pub fn measure<I>(origin: Point, base: Point, waypoints: I) -> Route
where
    I: IntoIterator<Item = (u64, Point)>,
{
    let mut stops = Vec::new();
    let mut cursor = origin;
    let mut total = 0.0;

    for (order_id, point) in waypoints {
        let leg_km = euclidean_km(&cursor, &point);
        total += leg_km;
        stops.push(RouteStop {
            order_id,
            point,
            leg_km,
        });
        cursor = point;
    }

    if stops.is_empty() {
        return Route::empty();
    }

    let return_leg_km = euclidean_km(&cursor, &base);
    Route {
        stops,
        return_leg_km,
        total_distance_km: total + return_leg_km,
    }
}

fn advance(at: DateTime<Utc>, by: Option<chrono::Duration>) -> Result<DateTime<Utc>, AppError> {
    by.and_then(|delta| at.checked_add_signed(delta)).ok_or_else(|| {
        AppError::Validation(format!("estimated time after {at} is out of range"))
    })
}

/// Projects arrival and departure times along a route. Fails when an
/// estimate cannot be represented, e.g. for a near-zero speed.
pub fn schedule(
    route: &Route,
    start_at: DateTime<Utc>,
    speed_kmh: f64,
    service_time: chrono::Duration,
) -> Result<Schedule, AppError> {
    let mut cursor = start_at;
    let mut stops = Vec::with_capacity(route.stops.len());

    for stop in &route.stops {
        let arrival = advance(cursor, travel_time(stop.leg_km, speed_kmh))?;
        let departure = advance(arrival, Some(service_time))?;
        stops.push(StopTimes { arrival, departure });
        cursor = departure;
    }

    Ok(Schedule {
        stops,
        finish_at: advance(cursor, travel_time(route.return_leg_km, speed_kmh))?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{measure, schedule, sequence};
    use crate::error::AppError;
    use crate::models::{Order, OrderStatus, Point, Priority};

    fn order(id: u64, x: f64, y: f64) -> Order {
        Order {
            id,
            customer: Point::new(x, y),
            weight_kg: 1.0,
            priority: Priority::Medium,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    const BASE: Point = Point::new(0.0, 0.0);

    #[test]
    fn visits_nearest_first_and_returns_to_base() {
        let far = order(1, 6.0, 8.0);
        let near = order(2, 3.0, 4.0);

        let route = sequence(BASE, BASE, &[&far, &near]);

        let ids: Vec<u64> = route.stops.iter().map(|s| s.order_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!((route.stops[0].leg_km - 5.0).abs() < 1e-9);
        assert!((route.stops[1].leg_km - 5.0).abs() < 1e-9);
        assert!((route.return_leg_km - 10.0).abs() < 1e-9);
        assert!((route.total_distance_km - 20.0).abs() < 1e-9);
    }

    #[test]
    fn equal_distance_goes_to_lower_id() {
        let b = order(9, 4.0, 3.0);
        let a = order(4, 3.0, 4.0);

        let route = sequence(BASE, BASE, &[&b, &a]);
        assert_eq!(route.stops[0].order_id, 4);
    }

    #[test]
    fn starts_from_drone_location_not_base() {
        let west = order(1, -2.0, 0.0);
        let east = order(2, 5.0, 0.0);

        let route = sequence(Point::new(4.0, 0.0), BASE, &[&west, &east]);

        assert_eq!(route.stops[0].order_id, 2);
        assert!((route.stops[0].leg_km - 1.0).abs() < 1e-9);
        assert!((route.total_distance_km - (1.0 + 7.0 + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_set_has_no_return_leg() {
        let route = sequence(Point::new(3.0, 3.0), BASE, &[]);
        assert!(route.stops.is_empty());
        assert_eq!(route.total_distance_km, 0.0);
    }

    #[test]
    fn measure_keeps_the_given_order() {
        let route = measure(
            BASE,
            BASE,
            vec![(1, Point::new(6.0, 8.0)), (2, Point::new(3.0, 4.0))],
        );
        assert_eq!(route.stops[0].order_id, 1);
        assert!((route.total_distance_km - 20.0).abs() < 1e-9);
    }

    #[test]
    fn schedule_adds_travel_and_service_time() {
        let a = order(1, 3.0, 4.0);
        let b = order(2, 6.0, 8.0);
        let route = sequence(BASE, BASE, &[&a, &b]);
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        let plan = schedule(&route, start, 40.0, chrono::Duration::seconds(60)).unwrap();

        assert_eq!(plan.stops[0].arrival, start + chrono::Duration::seconds(450));
        assert_eq!(plan.stops[0].departure, start + chrono::Duration::seconds(510));
        assert_eq!(plan.stops[1].arrival, start + chrono::Duration::seconds(960));
        assert_eq!(plan.stops[1].departure, start + chrono::Duration::seconds(1020));
        assert_eq!(plan.finish_at, start + chrono::Duration::seconds(1920));
    }

    #[test]
    fn unrepresentable_estimate_is_a_validation_error() {
        let a = order(1, 3.0, 4.0);
        let route = sequence(BASE, BASE, &[&a]);

        let slow = schedule(&route, Utc::now(), 1e-12, chrono::Duration::zero());
        assert!(matches!(slow, Err(AppError::Validation(_))));

        let endless = schedule(&route, Utc::now(), 40.0, chrono::Duration::MAX);
        assert!(matches!(endless, Err(AppError::Validation(_))));
    }
}
