pub mod attendance_record;
pub mod event;
pub mod event_attendance;
pub mod event_department;
pub mod event_participant;
pub mod schedule;
pub mod schedule_student;
