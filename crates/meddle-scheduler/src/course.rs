//! Course planning: turns a user's request into the stored schedule.

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use meddle_db::NewMedication;
use meddle_types::api::MedicationRequest;

use crate::dosage::DosageClock;
use crate::error::ValidationError;

struct Course {
    start_date: DateTime<Utc>,
    start_time: DateTime<Utc>,
    interval: TimeDelta,
    stop_date: DateTime<Utc>,
}

/// Schedule for a new course.
///
/// A start time still in the future is the first dose. Otherwise the first
/// dose is one interval after it. A course whose first dose would fall after
/// its stop date is planned as already done.
pub fn plan_new_course(
    request: &MedicationRequest,
    user_id: Uuid,
    now: DateTime<Utc>,
    dosage: &DosageClock,
) -> Result<NewMedication, ValidationError> {
    let course = validate(request)?;

    let candidate = if course.start_time > now {
        course.start_time
    } else {
        after_interval(&course)?
    };
    let next = dosage.next(candidate, course.start_time);

    Ok(new_medication(request, user_id, &course, next))
}

/// Schedule for an edited course. The next dose restarts one interval after
/// the (new) start time.
pub fn plan_course_edit(
    request: &MedicationRequest,
    user_id: Uuid,
    dosage: &DosageClock,
) -> Result<NewMedication, ValidationError> {
    let course = validate(request)?;
    let next = dosage.next(after_interval(&course)?, course.start_time);

    Ok(new_medication(request, user_id, &course, next))
}

fn validate(request: &MedicationRequest) -> Result<Course, ValidationError> {
    let start_date = parse_rfc3339(&request.start_date)
        .ok_or_else(|| ValidationError::StartDate(request.start_date.clone()))?;
    let start_time = parse_rfc3339(&request.start_time)
        .ok_or_else(|| ValidationError::StartTime(request.start_time.clone()))?;

    if request.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if request.dosage < 0 {
        return Err(ValidationError::Dosage(request.dosage));
    }

    let interval = TimeDelta::try_hours(request.time_interval)
        .filter(|_| request.time_interval > 0)
        .ok_or(ValidationError::TimeInterval(request.time_interval))?;

    let stop_date = TimeDelta::try_days(request.duration)
        .filter(|_| request.duration >= 0)
        .and_then(|days| start_time.checked_add_signed(days))
        .ok_or(ValidationError::Duration(request.duration))?;

    Ok(Course {
        start_date,
        start_time,
        interval,
        stop_date,
    })
}

fn after_interval(course: &Course) -> Result<DateTime<Utc>, ValidationError> {
    course
        .start_time
        .checked_add_signed(course.interval)
        .ok_or(ValidationError::TimeInterval(course.interval.num_hours()))
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn new_medication(
    request: &MedicationRequest,
    user_id: Uuid,
    course: &Course,
    next: DateTime<Utc>,
) -> NewMedication {
    NewMedication {
        user_id,
        name: request.name.trim().to_string(),
        dosage: request.dosage,
        time_interval: request.time_interval,
        duration: request.duration,
        prescribed_by: request.prescribed_by.clone(),
        purpose: request.purpose.clone(),
        icon: request.icon.clone(),
        start_date: course.start_date,
        start_time: course.start_time,
        next_dosage_time: next,
        stop_date: course.stop_date,
        done: next > course.stop_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn request(start: &str, interval: i64, duration: i64) -> MedicationRequest {
        MedicationRequest {
            name: "Amoxicillin".into(),
            dosage: 2,
            time_interval: interval,
            duration,
            start_date: start.into(),
            start_time: start.into(),
            prescribed_by: Some("Dr. Okafor".into()),
            purpose: None,
            icon: None,
        }
    }

    #[test]
    fn future_start_is_the_first_dose() {
        let plan = plan_new_course(
            &request("2024-03-10T08:00:30Z", 6, 3),
            Uuid::nil(),
            utc(9, 12, 0),
            &DosageClock::default(),
        )
        .unwrap();

        assert_eq!(plan.next_dosage_time, utc(10, 8, 0));
        assert_eq!(plan.stop_date, Utc.with_ymd_and_hms(2024, 3, 13, 8, 0, 30).unwrap());
        assert_eq!(plan.prescribed_by.as_deref(), Some("Dr. Okafor"));
    }

    #[test]
    fn past_start_skips_one_interval() {
        let plan = plan_new_course(
            &request("2024-03-10T08:00:00Z", 6, 3),
            Uuid::nil(),
            utc(10, 9, 0),
            &DosageClock::default(),
        )
        .unwrap();
        assert_eq!(plan.next_dosage_time, utc(10, 14, 0));
    }

    #[test]
    fn past_start_spilling_over_midnight_rolls_to_next_morning() {
        let plan = plan_new_course(
            &request("2024-03-10T20:00:00Z", 8, 5),
            Uuid::nil(),
            utc(10, 21, 0),
            &DosageClock::default(),
        )
        .unwrap();
        assert_eq!(plan.next_dosage_time, utc(11, 9, 0));
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let plan = plan_new_course(
            &request("2024-03-10T10:00:00+02:00", 4, 1),
            Uuid::nil(),
            utc(1, 0, 0),
            &DosageClock::default(),
        )
        .unwrap();
        assert_eq!(plan.start_time, utc(10, 8, 0));
    }

    #[test]
    fn edit_always_restarts_one_interval_after_start() {
        let plan = plan_course_edit(
            &request("2024-03-10T08:00:00Z", 6, 3),
            Uuid::nil(),
            &DosageClock::default(),
        )
        .unwrap();
        assert_eq!(plan.next_dosage_time, utc(10, 14, 0));
        assert_eq!(plan.stop_date, utc(13, 8, 0));
    }

    #[test]
    fn course_ending_before_its_first_dose_is_planned_done() {
        let clock = DosageClock::default();

        let lapsed = plan_new_course(
            &request("2024-03-10T08:00:00Z", 6, 0),
            Uuid::nil(),
            utc(10, 9, 0),
            &clock,
        )
        .unwrap();
        assert_eq!(lapsed.next_dosage_time, utc(10, 14, 0));
        assert_eq!(lapsed.stop_date, utc(10, 8, 0));
        assert!(lapsed.done);

        // A single dose still ahead is a valid course.
        let single = plan_new_course(
            &request("2024-03-10T08:00:00Z", 6, 0),
            Uuid::nil(),
            utc(10, 7, 0),
            &clock,
        )
        .unwrap();
        assert_eq!(single.next_dosage_time, single.stop_date);
        assert!(!single.done);

        let edited = plan_course_edit(&request("2024-03-10T08:00:00Z", 6, 0), Uuid::nil(), &clock)
            .unwrap();
        assert!(edited.done);
        assert!(!plan_course_edit(&request("2024-03-10T08:00:00Z", 6, 3), Uuid::nil(), &clock)
            .unwrap()
            .done);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let clock = DosageClock::default();
        let now = utc(1, 0, 0);

        let mut bad_date = request("2024-03-10T08:00:00Z", 6, 3);
        bad_date.start_date = "10/03/2024".into();
        assert_eq!(
            plan_new_course(&bad_date, Uuid::nil(), now, &clock),
            Err(ValidationError::StartDate("10/03/2024".into()))
        );

        let mut bad_time = request("2024-03-10T08:00:00Z", 6, 3);
        bad_time.start_time = "08:00".into();
        assert!(matches!(
            plan_course_edit(&bad_time, Uuid::nil(), &clock),
            Err(ValidationError::StartTime(_))
        ));

        let zero = request("2024-03-10T08:00:00Z", 0, 3);
        assert_eq!(
            plan_new_course(&zero, Uuid::nil(), now, &clock),
            Err(ValidationError::TimeInterval(0))
        );

        let huge = request("2024-03-10T08:00:00Z", i64::MAX, 3);
        assert!(plan_new_course(&huge, Uuid::nil(), now, &clock).is_err());

        let negative = request("2024-03-10T08:00:00Z", 6, -1);
        assert_eq!(
            plan_new_course(&negative, Uuid::nil(), now, &clock),
            Err(ValidationError::Duration(-1))
        );

        let mut blank = request("2024-03-10T08:00:00Z", 6, 3);
        blank.name = "  ".into();
        assert_eq!(
            plan_new_course(&blank, Uuid::nil(), now, &clock),
            Err(ValidationError::EmptyName)
        );
    }
}
