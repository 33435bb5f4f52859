pub mod course_enrollment;
pub mod course_notification_preference;
pub mod course_overview;
pub mod notification;
pub mod notification_preference;
pub mod preference_document;
pub mod user;
pub mod user_preference;

pub use course_enrollment::Entity as CourseEnrollment;
pub use course_notification_preference::{
    Entity as CourseNotificationPreference, Model as CourseNotificationPreferenceModel,
};
pub use course_overview::Entity as CourseOverview;
pub use notification::{Entity as Notification, Model as NotificationModel};
pub use notification_preference::{
    Entity as NotificationPreference, Model as NotificationPreferenceModel,
};
pub use user::{Entity as User, Model as UserModel};
pub use user_preference::Entity as UserPreference;
