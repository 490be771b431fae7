//! Actix actor handling persistence and delivery of events.

use actix::{
    Actor,
    AsyncContext,
    Context,
    Handler,
    Message,
    Supervised,
    SystemService,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use itertools::Itertools;
use std::time::Duration;

use crate::{
    db::{
        Pool,
        models as db,
        schema::events,
    },
    mail::Mailer,
    models::user::{FindUserError, User},
};
use super::{Error, events::Event};

/// Interval between two notification emails.
///
/// It's set to 30 minutes in production and one minute in development.
#[cfg(any(not(debug_assertions), doc))]
const NOTIFY_INTERVAL: Duration = Duration::from_secs(1800);

#[cfg(all(debug_assertions, not(doc)))]
const NOTIFY_INTERVAL: Duration = Duration::from_secs(60);

/// Notify a user of an event.
///
/// After receiving this message the event manager will persist `event` in
/// the database. The user is emailed later, with the next digest.
pub struct Notify {
    pub user: i32,
    pub event: Event,
}

impl Message for Notify {
    type Result = ();
}

/// Actix actor which persists events and periodically emails users a digest
/// of what they have not seen yet.
pub struct EventManager {
    pool: Pool,
    mailer: Mailer,
    last_notify: NaiveDateTime,
}

impl EventManager {
    /// Emit an event.
    ///
    /// Errors will be logged, but otherwise ignored: event delivery is
    /// dispatched after the originating transaction has committed and must
    /// never undo it.
    pub fn notify<E>(user: i32, event: E)
    where
        Event: From<E>,
    {
        let manager = EventManager::from_registry();
        let message = Notify {
            user,
            event: Event::from(event),
        };

        if let Err(err) = manager.try_send(message) {
            error!("Could not dispatch event notification: {}", err);
        }
    }

    /// Persist an event.
    fn do_notify(&mut self, msg: Notify) -> Result<(), Error> {
        let Notify { user, event } = msg;

        let db = self.pool.get()?;

        let data = event.to_vec()?;

        diesel::insert_into(events::table)
            .values(&db::NewEvent {
                user,
                kind: event.kind(),
                data: &data,
            })
            .execute(&*db)?;

        Ok(())
    }

    fn on_interval(&mut self, _: &mut Context<Self>) {
        match self.send_digests() {
            Ok(()) => {}
            Err(err) => error!("Error sending email notifications: {}", err),
        }
    }

    /// Send email digests for unread events.
    fn send_digests(&mut self) -> Result<(), Error> {
        let now = Utc::now().naive_utc();
        let db = self.pool.get()?;

        let events = events::table
            .filter(events::timestamp.ge(self.last_notify)
                .and(events::is_unread.eq(true)))
            .order((events::user, events::timestamp.asc()))
            .get_results::<db::Event>(&*db)?
            .into_iter()
            .group_by(|event| event.user);

        for (user, events) in events.into_iter() {
            let user = match User::by_id(&*db, user) {
                Ok(user) => user,
                Err(FindUserError::Internal(err)) => return Err(err.into()),
                Err(FindUserError::NotFound) => panic!(
                    "Inconsistent database: user doesn't exist but owns \
                    an event",
                ),
            };

            let lines = events
                .filter_map(|event| {
                    match Event::load(&event.kind, &event.data) {
                        Ok(ev) => Some(ev.describe()),
                        Err(err) => {
                            error!("could not load event {}: {}", event.id, err);
                            None
                        }
                    }
                })
                .collect::<Vec<_>>();

            if lines.is_empty() {
                continue;
            }

            self.mailer.send(
                user.mailbox(),
                "New activity requires your attention",
                &lines.join("\n"),
            );
        }

        self.last_notify = now;

        Ok(())
    }
}

impl Default for EventManager {
    fn default() -> Self {
        let config = crate::config::load().expect("Configuration is not loaded");

        Self {
            pool: crate::db::pool().expect("Database is not initialized"),
            mailer: Mailer::from_config(config.mail.clone())
                .expect("Mailer configuration is invalid"),
            last_notify: Utc::now().naive_utc(),
        }
    }
}

impl Actor for EventManager {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(NOTIFY_INTERVAL, Self::on_interval);
    }
}

impl Supervised for EventManager {
}

impl SystemService for EventManager {
}

impl Handler<Notify> for EventManager {
    type Result = ();

    fn handle(&mut self, msg: Notify, _: &mut Context<Self>) {
        match self.do_notify(msg) {
            Ok(()) => (),
            Err(err) => {
                error!("error persisting notification: {}", err);
            }
        }
    }
}
