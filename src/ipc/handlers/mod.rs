pub mod attendance;
pub mod classes;
pub mod core;
pub mod diary;
pub mod finance;
pub mod notices;
pub mod results;
pub mod staff;
pub mod students;
pub mod subjects;
pub mod teachers;
