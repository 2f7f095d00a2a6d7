/// Miles per kilometer (and mph per km/h)
pub const MILES_PER_KM: f64 = 0.621371;

pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh * MILES_PER_KM
}

pub fn mph_to_kmh(mph: f64) -> f64 {
    mph / MILES_PER_KM
}

pub fn km_to_miles(km: f64) -> f64 {
    km * MILES_PER_KM
}

/// "1h 2m 3s", "2m 3s" or "3s"
pub fn format_duration(seconds: u64) -> String {
    let hrs = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hrs > 0 {
        format!("{hrs}h {mins}m {secs}s")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
