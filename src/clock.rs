use crate::types::Session;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Etc::GMTPlus5;
use chrono_tz::Tz;
use tracing::warn;

/// Maps an absolute timestamp to an Eastern-Time minute and session label (C1, §4.1).
pub trait Clock: Send + Sync {
	fn classify(&self, ts: DateTime<Utc>) -> (DateTime<Utc>, Session);
}

/// DST-aware classifier using the IANA `America/New_York` zone. The default and
/// the only variant exercised by the end-to-end scenarios (§9 Timezone handling).
#[derive(Debug, Clone, Copy, Default)]
pub struct EasternClock;

impl Clock for EasternClock {
	fn classify(&self, ts: DateTime<Utc>) -> (DateTime<Utc>, Session) {
		classify_in(ts, New_York)
	}
}

/// Fixed UTC-5 fallback. Acceptable only when explicitly selected and flagged
/// at startup (§9); never used for the DST-aware test scenarios.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOffsetClock;

impl Clock for FixedOffsetClock {
	fn classify(&self, ts: DateTime<Utc>) -> (DateTime<Utc>, Session) {
		classify_in(ts, GMTPlus5)
	}
}

/// Builds the active clock from configuration, warning when the non-DST-aware
/// fallback is selected.
#[must_use]
pub fn build_clock(force_fixed_offset: bool) -> Box<dyn Clock> {
	if force_fixed_offset {
		warn!("clock.force_fixed_offset is set: using a fixed UTC-5 offset instead of DST-aware America/New_York");
		Box::new(FixedOffsetClock)
	} else {
		Box::new(EasternClock)
	}
}

fn classify_in(ts: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, Session) {
	let local = ts.with_timezone(&tz);
	let minute_local = local.date_naive().and_hms_opt(local.hour(), local.minute(), 0).unwrap_or_else(|| local.naive_local());
	let minute_ts = tz
		.from_local_datetime(&minute_local)
		.single()
		.unwrap_or(local)
		.with_timezone(&Utc);

	let session = session_for(local.hour(), local.minute());
	(minute_ts, session)
}

fn session_for(hour: u32, minute: u32) -> Session {
	let minutes_since_midnight = hour * 60 + minute;
	match minutes_since_midnight {
		m if (4 * 60..9 * 60 + 30).contains(&m) => Session::Premarket,
		m if (9 * 60 + 30..16 * 60).contains(&m) => Session::Regular,
		m if (16 * 60..20 * 60).contains(&m) => Session::Postmarket,
		_ => Session::Closed,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone as _;

	fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
		Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().expect("valid datetime")
	}

	#[test]
	fn classifies_premarket_in_summer_dst() {
		// 2024-06-10 08:30 ET == 12:30 UTC during EDT (UTC-4).
		let (_, session) = EasternClock.classify(utc(2024, 6, 10, 12, 30));
		assert_eq!(session, Session::Premarket);
	}

	#[test]
	fn classifies_regular_in_winter_standard_time() {
		// 2024-01-10 10:00 ET == 15:00 UTC during EST (UTC-5).
		let (_, session) = EasternClock.classify(utc(2024, 1, 10, 15, 0));
		assert_eq!(session, Session::Regular);
	}

	#[test]
	fn classifies_closed_overnight() {
		let (_, session) = EasternClock.classify(utc(2024, 1, 10, 6, 0));
		assert_eq!(session, Session::Closed);
	}

	#[test]
	fn minute_boundary_truncates_seconds() {
		let ts = Utc.with_ymd_and_hms(2024, 6, 10, 12, 30, 45).single().expect("valid datetime");
		let (minute_ts, _) = EasternClock.classify(ts);
		assert_eq!(minute_ts.second(), 0);
	}
}
