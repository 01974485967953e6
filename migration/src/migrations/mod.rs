pub mod m202601120001_create_schedules;
pub mod m202601120002_create_attendance_records;
pub mod m202601120003_create_events;
pub mod m202601120004_create_event_attendances;
