use uuid::Uuid;

use super::Error;

/// An occurrence a user should be told about.
#[derive(Clone, Debug)]
pub enum Event {
    ReviewRequested(ReviewRequested),
    RevisionApproved(RevisionApproved),
    RevisionRejected(RevisionRejected),
}

/// A manual was submitted for review.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReviewRequested {
    /// Manual awaiting a decision.
    pub manual: Uuid,
    /// Title of the manual at submission time.
    pub title: String,
    /// Revision under review.
    pub revision: i32,
    /// User who submitted.
    pub who: i32,
}

/// A revision was approved.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RevisionApproved {
    pub manual: Uuid,
    pub title: String,
    pub revision: i32,
    /// User who approved.
    pub who: i32,
}

/// A revision was rejected.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RevisionRejected {
    pub manual: Uuid,
    pub title: String,
    pub revision: i32,
    /// User who rejected.
    pub who: i32,
    pub reason: String,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match *self {
            Event::ReviewRequested(_) => "review-requested",
            Event::RevisionApproved(_) => "revision-approved",
            Event::RevisionRejected(_) => "revision-rejected",
        }
    }

    /// Serialize payload for storage.
    pub fn to_vec(&self) -> Result<Vec<u8>, Error> {
        match *self {
            Event::ReviewRequested(ref ev) => rmps::to_vec_named(ev),
            Event::RevisionApproved(ref ev) => rmps::to_vec_named(ev),
            Event::RevisionRejected(ref ev) => rmps::to_vec_named(ev),
        }.map_err(Error::Serialization)
    }

    /// Reconstruct an event from its stored kind and payload.
    pub fn load(kind: &str, data: &[u8]) -> Result<Event, Error> {
        match kind {
            "review-requested" =>
                rmps::from_slice(data).map(Event::ReviewRequested),
            "revision-approved" =>
                rmps::from_slice(data).map(Event::RevisionApproved),
            "revision-rejected" =>
                rmps::from_slice(data).map(Event::RevisionRejected),
            _ => return Err(Error::UnknownEvent(kind.to_string())),
        }.map_err(Error::Deserialization)
    }

    /// One plain-text line describing this event in a notification email.
    pub fn describe(&self) -> String {
        match *self {
            Event::ReviewRequested(ref ev) => format!(
                "Manual \u{201c}{}\u{201d} was submitted for review.", ev.title),
            Event::RevisionApproved(ref ev) => format!(
                "Your manual \u{201c}{}\u{201d} was approved.", ev.title),
            Event::RevisionRejected(ref ev) => format!(
                "Your manual \u{201c}{}\u{201d} was rejected: {}",
                ev.title, ev.reason),
        }
    }
}

impl_from! { for Event ;
    ReviewRequested => |e| Event::ReviewRequested(e),
    RevisionApproved => |e| Event::RevisionApproved(e),
    RevisionRejected => |e| Event::RevisionRejected(e),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_events_round_trip_through_kind_dispatch() {
        let event = Event::from(RevisionRejected {
            manual: Uuid::nil(),
            title: "GOM".into(),
            revision: 7,
            who: 3,
            reason: "incomplete".into(),
        });

        let data = event.to_vec().unwrap();
        let loaded = Event::load(event.kind(), &data).unwrap();

        match loaded {
            Event::RevisionRejected(ev) => {
                assert_eq!(ev.revision, 7);
                assert_eq!(ev.reason, "incomplete");
            }
            other => panic!("wrong event kind: {:?}", other),
        }
    }

    #[test]
    fn unknown_kinds_are_refused() {
        assert!(Event::load("no-such-kind", &[]).is_err());
    }
}
