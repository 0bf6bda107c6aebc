//! Users as supplied by the identity provider.

use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::PermissionError;
use crate::notification::Channel;

/// A customer or administrator.
///
/// Authentication happens elsewhere; these fields are trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default = "default_notify_email")]
    pub notify_email: bool,
    #[serde(default)]
    pub notify_sms: bool,
    #[serde(default)]
    pub is_admin: bool,
}

fn default_notify_email() -> bool {
    true
}

impl User {
    /// Creates a customer with the default notification preferences.
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: None,
            phone_number: None,
            notify_email: true,
            notify_sms: false,
            is_admin: false,
        }
    }

    /// Sets the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// Sets both notification opt-ins.
    pub fn with_preferences(mut self, notify_email: bool, notify_sms: bool) -> Self {
        self.notify_email = notify_email;
        self.notify_sms = notify_sms;
        self
    }

    /// Channels this user should be notified on.
    ///
    /// A channel is included only when the user opted in and has the contact
    /// detail it needs.
    pub fn notification_channels(&self) -> Vec<Channel> {
        let mut channels = Vec::new();
        if self.notify_email && has_value(&self.email) {
            channels.push(Channel::Email);
        }
        if self.notify_sms && has_value(&self.phone_number) {
            channels.push(Channel::Sms);
        }
        channels
    }
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Actor {
    /// Creates a non-admin actor.
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    /// Creates an admin actor.
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// Requires that the actor owns the order. Used by every payment mutation.
    pub fn ensure_owner(&self, order_id: OrderId, owner: UserId) -> Result<(), PermissionError> {
        if self.user_id == owner {
            Ok(())
        } else {
            Err(PermissionError::NotOrderOwner {
                user_id: self.user_id,
                order_id,
            })
        }
    }

    /// Requires that the actor owns the order or is an admin. Used by reads.
    pub fn ensure_can_view(&self, order_id: OrderId, owner: UserId) -> Result<(), PermissionError> {
        if self.is_admin {
            return Ok(());
        }
        self.ensure_owner(order_id, owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_notify_by_email_only() {
        let user = User::new(UserId::new(1), "alice")
            .with_email("alice@example.com")
            .with_phone("+15550100");
        assert_eq!(user.notification_channels(), vec![Channel::Email]);
    }

    #[test]
    fn sms_requires_opt_in_and_phone() {
        let user = User::new(UserId::new(1), "bob")
            .with_preferences(true, true)
            .with_phone("+15550100");
        assert_eq!(user.notification_channels(), vec![Channel::Sms]);

        let no_phone = User::new(UserId::new(2), "carol").with_preferences(false, true);
        assert!(no_phone.notification_channels().is_empty());
    }

    #[test]
    fn blank_email_is_not_a_channel() {
        let user = User::new(UserId::new(1), "dave").with_email("  ");
        assert!(user.notification_channels().is_empty());
    }

    #[test]
    fn only_owner_may_mutate() {
        let order = OrderId::new(10);
        let owner = UserId::new(1);
        assert!(Actor::customer(owner).ensure_owner(order, owner).is_ok());
        assert!(Actor::admin(UserId::new(2)).ensure_owner(order, owner).is_err());
        assert!(
            Actor::admin(UserId::new(2))
                .ensure_can_view(order, owner)
                .is_ok()
        );
        assert!(
            Actor::customer(UserId::new(3))
                .ensure_can_view(order, owner)
                .is_err()
        );
    }

    #[test]
    fn deserializes_with_default_preferences() {
        let user: User = serde_json::from_str(
            r#"{"id": 5, "username": "erin", "email": null, "phone_number": null}"#,
        )
        .unwrap();
        assert!(user.notify_email);
        assert!(!user.notify_sms);
        assert!(!user.is_admin);
    }
}
