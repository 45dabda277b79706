//! GARP Applicant, Registrar and LeaveAll state machines (802.1D clause 12).
//!
//! The machines are pure transition functions. The engine applies the
//! returned actions: transmit scheduling, leave timer control and
//! join/leave indications.

use std::fmt;

use crate::types::{AttributeEvent, RegistrarAdmin};

/// Events delivered to the per-attribute state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GarpEvent {
    /// A transmit opportunity.
    TransmitPdu,
    RxJoinIn,
    RxJoinEmpty,
    RxEmpty,
    RxLeaveIn,
    RxLeaveEmpty,
    /// LeaveAll, received or generated by this participant.
    LeaveAll,
    /// Local request to declare the attribute.
    ReqJoin,
    /// Local request to withdraw the declaration.
    ReqLeave,
    /// Registrar leave timer expiry.
    LeaveTimer,
}

impl From<AttributeEvent> for GarpEvent {
    fn from(event: AttributeEvent) -> Self {
        match event {
            AttributeEvent::LeaveAll => GarpEvent::LeaveAll,
            AttributeEvent::JoinEmpty => GarpEvent::RxJoinEmpty,
            AttributeEvent::JoinIn => GarpEvent::RxJoinIn,
            AttributeEvent::LeaveEmpty => GarpEvent::RxLeaveEmpty,
            AttributeEvent::LeaveIn => GarpEvent::RxLeaveIn,
            AttributeEvent::Empty => GarpEvent::RxEmpty,
        }
    }
}

/// Applicant states.
///
/// First letter: Very anxious, Anxious, Quiet, Leaving. Second letter:
/// Active member, Passive member, Observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicantState {
    VA,
    AA,
    QA,
    LA,
    VP,
    AP,
    QP,
    VO,
    AO,
    QO,
    LO,
}

/// Message an applicant emits on a transmit opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicantAction {
    None,
    /// JoinIn or JoinEmpty depending on the registrar.
    SendJoin,
    /// LeaveIn or LeaveEmpty depending on the registrar.
    SendLeave,
    SendEmpty,
}

impl ApplicantAction {
    /// Wire event for this action given whether the local registrar holds a
    /// registration.
    pub fn wire_event(self, registered: bool) -> Option<AttributeEvent> {
        match (self, registered) {
            (ApplicantAction::None, _) => None,
            (ApplicantAction::SendJoin, true) => Some(AttributeEvent::JoinIn),
            (ApplicantAction::SendJoin, false) => Some(AttributeEvent::JoinEmpty),
            (ApplicantAction::SendLeave, true) => Some(AttributeEvent::LeaveIn),
            (ApplicantAction::SendLeave, false) => Some(AttributeEvent::LeaveEmpty),
            (ApplicantAction::SendEmpty, _) => Some(AttributeEvent::Empty),
        }
    }
}

impl ApplicantState {
    /// State of a freshly created GID.
    pub const INITIAL: ApplicantState = ApplicantState::VO;

    /// Applies one event.
    pub fn step(self, event: GarpEvent) -> (ApplicantState, ApplicantAction) {
        use ApplicantAction::*;
        use ApplicantState::*;

        match event {
            GarpEvent::TransmitPdu => match self {
                VA | VP => (AA, SendJoin),
                AA | AP => (QA, SendJoin),
                LA => (VO, SendLeave),
                LO => (VO, SendEmpty),
                other => (other, None),
            },
            GarpEvent::RxJoinIn => (
                match self {
                    VA => AA,
                    AA | QA => QA,
                    LA => LA,
                    VP => AP,
                    AP | QP => QP,
                    VO | LO => AO,
                    AO | QO => QO,
                },
                None,
            ),
            GarpEvent::RxJoinEmpty | GarpEvent::RxEmpty => (
                match self {
                    VA | AA | QA => VA,
                    LA => LA,
                    VP | AP | QP => VP,
                    VO | AO | QO | LO => VO,
                },
                None,
            ),
            GarpEvent::RxLeaveIn => (
                match self {
                    VA | AA | QA => VA,
                    LA => LA,
                    VP | AP | QP => VP,
                    VO | AO | QO | LO => LO,
                },
                None,
            ),
            GarpEvent::RxLeaveEmpty | GarpEvent::LeaveAll => (
                match self {
                    VA | AA | QA | VP | AP | QP => VP,
                    LA | VO | AO | QO | LO => LO,
                },
                None,
            ),
            GarpEvent::ReqJoin => (
                match self {
                    LA => VA,
                    VO | LO => VP,
                    AO => AP,
                    QO => QP,
                    other => other,
                },
                None,
            ),
            GarpEvent::ReqLeave => (
                match self {
                    VA | AA | QA => LA,
                    VP => VO,
                    AP => AO,
                    QP => QO,
                    other => other,
                },
                None,
            ),
            GarpEvent::LeaveTimer => (self, None),
        }
    }

    /// True while the applicant is waiting for a transmit opportunity.
    pub fn needs_transmit(self) -> bool {
        matches!(
            self,
            ApplicantState::VA
                | ApplicantState::AA
                | ApplicantState::LA
                | ApplicantState::VP
                | ApplicantState::AP
                | ApplicantState::LO
        )
    }

    /// True if this participant declares (or is about to declare) the
    /// attribute.
    pub fn is_declaring(self) -> bool {
        matches!(
            self,
            ApplicantState::VA
                | ApplicantState::AA
                | ApplicantState::QA
                | ApplicantState::VP
                | ApplicantState::AP
                | ApplicantState::QP
        )
    }
}

impl fmt::Display for ApplicantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Registrar states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrarState {
    In,
    /// Leaving: registered, leave timer running.
    Lv,
    /// Empty.
    Mt,
    Fixed,
    Forbidden,
}

/// Registration change reported by a registrar transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indication {
    None,
    Join,
    Leave,
}

/// Leave timer operation requested by a registrar transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveTimerOp {
    Keep,
    Start,
    Stop,
}

/// Outcome of a registrar transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrarStep {
    pub next: RegistrarState,
    pub indication: Indication,
    pub timer: LeaveTimerOp,
}

impl RegistrarStep {
    fn stay(state: RegistrarState) -> Self {
        Self {
            next: state,
            indication: Indication::None,
            timer: LeaveTimerOp::Keep,
        }
    }
}

impl RegistrarState {
    /// State of a freshly created GID.
    pub const INITIAL: RegistrarState = RegistrarState::Mt;

    /// Applies one protocol event. Fixed and Forbidden ignore all of them.
    pub fn step(self, event: GarpEvent) -> RegistrarStep {
        use RegistrarState::*;

        match (self, event) {
            (Mt, GarpEvent::RxJoinIn | GarpEvent::RxJoinEmpty) => RegistrarStep {
                next: In,
                indication: Indication::Join,
                timer: LeaveTimerOp::Keep,
            },
            (Lv, GarpEvent::RxJoinIn | GarpEvent::RxJoinEmpty) => RegistrarStep {
                next: In,
                indication: Indication::None,
                timer: LeaveTimerOp::Stop,
            },
            (In, GarpEvent::RxLeaveIn | GarpEvent::RxLeaveEmpty | GarpEvent::LeaveAll) => {
                RegistrarStep {
                    next: Lv,
                    indication: Indication::None,
                    timer: LeaveTimerOp::Start,
                }
            }
            (Lv, GarpEvent::LeaveTimer) => RegistrarStep {
                next: Mt,
                indication: Indication::Leave,
                timer: LeaveTimerOp::Keep,
            },
            (state, _) => RegistrarStep::stay(state),
        }
    }

    /// Applies an administrative control change.
    pub fn administrative(self, admin: RegistrarAdmin) -> RegistrarStep {
        use RegistrarState::*;

        let timer = if self == Lv {
            LeaveTimerOp::Stop
        } else {
            LeaveTimerOp::Keep
        };

        match admin {
            RegistrarAdmin::Fixed => RegistrarStep {
                next: Fixed,
                indication: if self.is_registered() {
                    Indication::None
                } else {
                    Indication::Join
                },
                timer,
            },
            RegistrarAdmin::Forbidden => RegistrarStep {
                next: Forbidden,
                indication: if self.is_registered() {
                    Indication::Leave
                } else {
                    Indication::None
                },
                timer,
            },
            RegistrarAdmin::Normal => match self {
                Fixed => RegistrarStep::stay(In),
                Forbidden => RegistrarStep::stay(Mt),
                other => RegistrarStep::stay(other),
            },
        }
    }

    /// IN, LV and Fixed hold a registration.
    pub fn is_registered(self) -> bool {
        matches!(self, RegistrarState::In | RegistrarState::Lv | RegistrarState::Fixed)
    }

    pub fn admin(self) -> RegistrarAdmin {
        match self {
            RegistrarState::Fixed => RegistrarAdmin::Fixed,
            RegistrarState::Forbidden => RegistrarAdmin::Forbidden,
            _ => RegistrarAdmin::Normal,
        }
    }
}

impl fmt::Display for RegistrarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrarState::In => "IN",
            RegistrarState::Lv => "LV",
            RegistrarState::Mt => "MT",
            RegistrarState::Fixed => "Fixed",
            RegistrarState::Forbidden => "Forbidden",
        };
        write!(f, "{}", s)
    }
}

/// Per-participant LeaveAll state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaveAllState {
    /// A LeaveAll goes out on the next transmit opportunity.
    Active,
    #[default]
    Passive,
}

impl LeaveAllState {
    /// Leaveall timer expiry.
    pub fn timer_expired(self) -> LeaveAllState {
        LeaveAllState::Active
    }

    /// Transmit opportunity; returns whether a LeaveAll is sent.
    pub fn transmit(self) -> (LeaveAllState, bool) {
        (LeaveAllState::Passive, self == LeaveAllState::Active)
    }

    /// LeaveAll received from the LAN.
    pub fn received(self) -> LeaveAllState {
        LeaveAllState::Passive
    }
}
