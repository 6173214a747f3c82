pub mod ledger;
pub mod member;
pub mod review;
pub mod salon;
pub mod session;
pub mod token;

pub use ledger::{Direction, LedgerPage, PointChange, PointLedgerEntry};
pub use member::{Member, MemberProfile, Rank};
pub use review::{Review, ReviewSlot};
pub use salon::{
    NewReservation, Reservation, ReservationStatus, Service, StaffException, StaffSchedule,
};
pub use session::{AdminRole, ApiSession, SessionKind};
pub use token::{ActionToken, NewActionToken, TokenKind, TokenStatus, TtlPolicy};
