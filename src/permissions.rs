use failure::Fail;

use crate::ApiError;

bitflags! {
    /// Permissions allow for a fine-grained control over what actions a given
    /// user can take.
    pub struct PermissionBits: i32 {
        /// All bits allocated for user management permissions.
        const MANAGE_USERS_BITS = 0x0000000f;
        /// Permission holder can add new users to the platform.
        const INVITE_USER = 0x00000001;
        /// Permission holder can change other users' permissions.
        const EDIT_USER_PERMISSIONS = 0x00000002;
        /// All bits allocated for manual management permissions.
        const MANAGE_CONTENT_BITS = 0x000000f0;
        /// Permission holder can create and edit manuals and their chapters.
        const EDIT_MANUAL = 0x00000010;
        /// Permission holder can approve or reject revisions under review,
        /// and submit manuals they do not own.
        const REVIEW_DECISION = 0x00000020;
        /// Permission holder can archive manuals.
        const ARCHIVE_MANUAL = 0x00000040;
    }
}

impl PermissionBits {
    /// Get set of all elevated permissions.
    #[inline]
    pub fn elevated() -> PermissionBits {
        PermissionBits::all()
    }

    /// Get set of all (non-elevated) permissions.
    #[inline]
    pub fn normal() -> PermissionBits {
        PermissionBits::empty()
    }

    /// Verify that all required permissions are present.
    ///
    /// This is the same check as `self.contains(permissions)`, but returns an
    /// [`ApiError`].
    pub fn require(&self, permissions: PermissionBits)
    -> Result<(), RequirePermissionsError> {
        if self.contains(permissions) {
            Ok(())
        } else {
            Err(RequirePermissionsError(permissions - *self))
        }
    }
}

pub trait Permission {
    /// Permissions are stored as bit-flags, and this field is a mask of bits
    /// corresponding to this permission (or combination of permissions).
    fn bits() -> PermissionBits;
}

macro_rules! permission {
    (
        $name:ident = $value:expr
    ) => {
        pub struct $name;

        impl Permission for $name {
            #[inline]
            fn bits() -> PermissionBits {
                $value
            }
        }
    };
}

permission!(InviteUser = PermissionBits::INVITE_USER);
permission!(EditUserPermissions = PermissionBits::EDIT_USER_PERMISSIONS);
permission!(EditManual = PermissionBits::EDIT_MANUAL);
permission!(ReviewDecision = PermissionBits::REVIEW_DECISION);
permission!(ArchiveManual = PermissionBits::ARCHIVE_MANUAL);

#[derive(ApiError, Debug, Fail)]
#[api(status = "FORBIDDEN", code = "user:insufficient-permissions")]
#[fail(display = "Missing required permissions: {:?}", _0)]
pub struct RequirePermissionsError(PermissionBits);

macro_rules! impl_permissons {
    {
        $( ($($name:ident),+) );+ $(;)*
    } => {
        $(
            impl<$($name),+> Permission for ($($name),+)
            where
                $($name: Permission,)+
            {
                #[inline]
                fn bits() -> PermissionBits {
                    $($name::bits())|+
                }
            }
        )+
    };
}

impl_permissons! {
    (A, B);
    (A, B, C);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_missing_bits() {
        let held = PermissionBits::EDIT_MANUAL;
        assert!(held.require(PermissionBits::EDIT_MANUAL).is_ok());
        assert!(held.require(PermissionBits::REVIEW_DECISION).is_err());
        assert!(held
            .require(PermissionBits::EDIT_MANUAL | PermissionBits::REVIEW_DECISION)
            .is_err());
    }

    #[test]
    fn elevated_contains_every_permission() {
        assert!(PermissionBits::elevated().contains(PermissionBits::REVIEW_DECISION));
        assert!(PermissionBits::normal().is_empty());
    }
}
