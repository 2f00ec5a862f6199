//! Tests for topic notification unwrapping.

use super::*;
use crate::message::{MessageId, ReceiptHandle, MESSAGE_GROUP_ID_ATTRIBUTE};
use std::str::FromStr;

const TOPIC_ARN: &str = "arn:aws:sns:eu-central-1:123456789012:orders";

fn raw(body: &str) -> RawMessage {
    RawMessage::new(
        MessageId::from_str("m1").unwrap(),
        body,
        ReceiptHandle::new("r1".to_string()).unwrap(),
    )
}

fn notification_body(message: &str) -> String {
    serde_json::json!({
        "Type": "Notification",
        "MessageId": "sns-1",
        "TopicArn": TOPIC_ARN,
        "Message": message,
        "Timestamp": "2024-03-01T12:00:00.000Z",
        "SignatureVersion": "1",
        "Signature": "c2lnbmF0dXJl",
        "SigningCertURL": "https://sns.eu-central-1.amazonaws.com/cert.pem",
        "UnsubscribeURL": "https://sns.eu-central-1.amazonaws.com/?Action=Unsubscribe"
    })
    .to_string()
}

mod unwrap_tests {
    use super::*;

    /// Verify the body is replaced while identifiers and group key survive
    #[test]
    fn test_unwrap_replaces_body() {
        // Arrange
        let message = raw(&notification_body(r#"{"x":1}"#))
            .with_attribute(MESSAGE_GROUP_ID_ATTRIBUTE, "g1");

        // Act
        let unwrapped = NotificationUnwrapper::new().unwrap(message).unwrap();

        // Assert
        assert_eq!(unwrapped.body, r#"{"x":1}"#);
        assert_eq!(unwrapped.message_id.as_str(), "m1");
        assert_eq!(unwrapped.receipt_handle.as_str(), "r1");
        assert_eq!(unwrapped.message_group_id().unwrap().as_str(), "g1");
    }

    /// Verify a body that is not a notification is rejected
    #[test]
    fn test_malformed_notification_is_rejected() {
        let result = NotificationUnwrapper::new().unwrap(raw(r#"{"x":1}"#));

        assert!(matches!(
            result,
            Err(PreprocessError::MalformedNotification { .. })
        ));
    }

    /// Verify non-JSON bodies are rejected
    #[test]
    fn test_non_json_body_is_rejected() {
        let result = NotificationUnwrapper::new().unwrap(raw("plain text"));

        assert!(matches!(
            result,
            Err(PreprocessError::MalformedNotification { .. })
        ));
    }

    /// Verify subscription confirmations are not treated as payloads
    #[test]
    fn test_subscription_confirmation_is_rejected() {
        let body = notification_body("confirm").replace("\"Notification\"", "\"SubscriptionConfirmation\"");

        let result = NotificationUnwrapper::new().unwrap(raw(&body));

        match result {
            Err(PreprocessError::UnexpectedNotificationType { notification_type }) => {
                assert_eq!(notification_type, "SubscriptionConfirmation");
            }
            other => panic!("Expected UnexpectedNotificationType, got {:?}", other),
        }
    }

    /// Verify the expected-topic check
    #[test]
    fn test_topic_filter() {
        let matching = NotificationUnwrapper::new().with_expected_topic(TOPIC_ARN);
        assert!(matching.unwrap(raw(&notification_body("a"))).is_ok());

        let other = NotificationUnwrapper::new()
            .with_expected_topic("arn:aws:sns:eu-central-1:123456789012:invoices");
        let result = other.unwrap(raw(&notification_body("a")));
        assert!(matches!(result, Err(PreprocessError::TopicMismatch { .. })));
    }
}

mod notification_tests {
    use super::*;

    /// Verify a wrapped notification parses back with the same message
    #[test]
    fn test_new_notification_body_is_parseable() {
        let notification = Notification::new(TOPIC_ARN, "payload").with_subject("orders");

        let body = notification.to_body().unwrap();
        let parsed = Notification::parse(&body).unwrap();

        assert_eq!(parsed.notification_type, NOTIFICATION_TYPE);
        assert_eq!(parsed.topic_arn, TOPIC_ARN);
        assert_eq!(parsed.message, "payload");
        assert_eq!(parsed.subject.as_deref(), Some("orders"));
        assert!(body.contains("\"TopicArn\""));
        assert!(!body.contains("SigningCertURL"));
    }

    #[test]
    fn test_signature_fields_are_parsed() {
        let parsed = Notification::parse(&notification_body("x")).unwrap();

        assert_eq!(parsed.signature_version.as_deref(), Some("1"));
        assert!(parsed.signing_cert_url.is_some());
        assert!(parsed.unsubscribe_url.is_some());
    }
}

mod signature_verification_tests {
    use super::*;
    use crate::signature::CertificateFetcher;
    use url::Url;

    const SIGNED_NOTIFICATION: &str = include_str!("../testdata/sns-notification.json");

    struct FixtureFetcher;

    #[async_trait]
    impl CertificateFetcher for FixtureFetcher {
        async fn fetch(&self, _url: &Url) -> Result<String, PreprocessError> {
            Ok(include_str!("../testdata/sns-signing-cert.pem").to_string())
        }
    }

    fn verifying_unwrapper() -> NotificationUnwrapper {
        NotificationUnwrapper::new().with_signature_verifier(SignatureVerifier::with_fetcher(FixtureFetcher))
    }

    /// Verify a correctly signed notification is unwrapped
    #[tokio::test]
    async fn test_signed_notification_is_unwrapped() {
        let unwrapper = verifying_unwrapper();

        let unwrapped = unwrapper.process(raw(SIGNED_NOTIFICATION)).await.unwrap();

        assert!(unwrapper.verifies_signatures());
        assert_eq!(unwrapped.body, r#"{"id":1,"customer":"alice"}"#);
        assert_eq!(unwrapped.message_id.as_str(), "m1");
    }

    /// Verify a forged notification is rejected before unwrapping
    #[tokio::test]
    async fn test_forged_notification_is_rejected() {
        let forged = SIGNED_NOTIFICATION.replace("alice", "mallory");

        let result = verifying_unwrapper().process(raw(&forged)).await;

        assert!(matches!(result, Err(PreprocessError::InvalidSignature { .. })));
    }

    /// Verify signatures are ignored unless verification is enabled
    #[tokio::test]
    async fn test_verification_is_opt_in() {
        let unwrapper = NotificationUnwrapper::new();

        let unwrapped = unwrapper.process(raw(&notification_body("unsigned"))).await.unwrap();

        assert!(!unwrapper.verifies_signatures());
        assert_eq!(unwrapped.body, "unsigned");
    }
}
