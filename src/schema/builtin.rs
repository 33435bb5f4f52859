use super::{
    AppSpec, Channel, EmailCadence, NotificationTypeSpec, PreferenceSchema,
    COURSE_NOTIFICATION_CONFIG_VERSION,
};

pub(super) fn course_notification_schema() -> PreferenceSchema {
    PreferenceSchema::new(
        COURSE_NOTIFICATION_CONFIG_VERSION,
        vec![discussion_app(), updates_app(), grading_app()],
    )
}

fn discussion_app() -> AppSpec {
    AppSpec::new("discussion", true, true, true, EmailCadence::Daily)
        .core_info(
            "Notifications for responses and comments on your posts, and the ones you're following, \
             including endorsements to your responses and on your posts.",
        )
        .with_type(
            NotificationTypeSpec::core("new_response")
                .icon("QUESTION_ANSWER_OUTLINE")
                .content_template("{replier_name} responded to your post {post_title}"),
        )
        .with_type(
            NotificationTypeSpec::core("new_comment")
                .icon("QUESTION_ANSWER_OUTLINE")
                .content_template(
                    "{replier_name} commented on {author_name} response to your post {post_title}",
                ),
        )
        .with_type(
            NotificationTypeSpec::core("new_comment_on_response")
                .icon("QUESTION_ANSWER_OUTLINE")
                .content_template("{replier_name} commented on your response to the post {post_title}"),
        )
        .with_type(
            NotificationTypeSpec::core("response_on_followed_post")
                .icon("QUESTION_ANSWER_OUTLINE")
                .content_template("{replier_name} responded to a post you're following: {post_title}"),
        )
        .with_type(
            NotificationTypeSpec::core("comment_on_followed_post")
                .icon("QUESTION_ANSWER_OUTLINE")
                .content_template(
                    "{replier_name} commented on {author_name} response in a post you're following {post_title}",
                ),
        )
        .with_type(
            NotificationTypeSpec::core("response_endorsed_on_thread")
                .icon("VERIFIED")
                .content_template("Your post {post_title} has an endorsed response"),
        )
        .with_type(
            NotificationTypeSpec::core("response_endorsed")
                .icon("VERIFIED")
                .content_template("Your response has been endorsed on the post {post_title}"),
        )
        .with_type(
            NotificationTypeSpec::new("new_discussion_post", false, false, false, EmailCadence::Daily)
                .info("New discussion posts in your course")
                .icon("POST_OUTLINE")
                .content_template("{username} posted {post_title}"),
        )
        .with_type(
            NotificationTypeSpec::new("new_question_post", false, false, false, EmailCadence::Daily)
                .info("New questions in your course")
                .icon("HELP_OUTLINE")
                .content_template("{username} asked {post_title}"),
        )
        .with_type(
            NotificationTypeSpec::new("content_reported", true, true, true, EmailCadence::Daily)
                .info("Reported content awaiting moderation")
                .icon("REPORT_RED")
                .content_template("{username}'s {content_type} has been reported {content}"),
        )
        .with_type(
            NotificationTypeSpec::new(
                "new_instructor_all_learners_post",
                true,
                false,
                false,
                EmailCadence::Daily,
            )
            .info("Posts from your instructors to all learners")
            .icon("POST_OUTLINE")
            .content_template("Your instructor posted {post_title}"),
        )
}

fn updates_app() -> AppSpec {
    AppSpec::new("updates", true, true, true, EmailCadence::Daily).with_type(
        NotificationTypeSpec::new("course_updates", true, true, true, EmailCadence::Daily)
            .info("Course announcements from your instructors")
            .icon("NEWSPAPER")
            .content_template("New update in your course: {course_update_content}"),
    )
}

fn grading_app() -> AppSpec {
    AppSpec::new("grading", true, true, true, EmailCadence::Daily)
        .with_type(
            NotificationTypeSpec::new("ora_staff_notifications", true, false, false, EmailCadence::Daily)
                .info("Open response submissions awaiting review")
                .icon("OPEN_RESPONSE_OUTLINE")
                .non_editable(&[Channel::Push])
                .content_template("You have a new open response submission awaiting review for {ora_name}"),
        )
        .with_type(
            NotificationTypeSpec::new("ora_grade_assigned", true, false, true, EmailCadence::Daily)
                .info("Grades assigned to your open responses")
                .icon("OPEN_RESPONSE_OUTLINE")
                .non_editable(&[Channel::Push])
                .content_template("{points_earned}/{points_possible} grade was assigned on {ora_name}"),
        )
}
