pub mod countdown;
pub mod poller;
pub mod reservation;
pub mod payment;
pub mod handshake;

pub use countdown::{Countdown, CountdownHandle};
pub use poller::{PollOutcome, PollerConfig, PollerHandle, StatusPoller};
pub use reservation::ReservationRequester;
pub use payment::PaymentSessionManager;
pub use handshake::{BookingRequest, CancelHandle, Handshake, HandshakeConfig, Phase, Settlement};
