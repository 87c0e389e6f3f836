//! Minimal ARN parsing, enough to read the account ID of a caller identity.
//!
//! Format: `arn:partition:service:region:account-id:resource`
use thiserror::Error;

const ARN_PREFIX: &str = "arn:";
const ARN_SECTIONS: usize = 6;

/// Errors produced while parsing an ARN.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArnError {
    #[error("arn: invalid prefix")]
    InvalidPrefix,
    #[error("arn: not enough sections")]
    InvalidSections,
    #[error("arn: invalid partition")]
    MissingPartition,
    #[error("arn: invalid service")]
    MissingService,
    #[error("arn: invalid resource")]
    MissingResource,
}

/// The sections of an Amazon Resource Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn<'a> {
    /// Partition, e.g. `aws` or `aws-cn`.
    pub partition: &'a str,
    /// Service namespace, e.g. `iam`.
    pub service: &'a str,
    /// Region, empty for global resources.
    pub region: &'a str,
    /// Account ID owning the resource.
    pub account_id: &'a str,
    /// Resource path, possibly containing further colons.
    pub resource: &'a str,
}

impl<'a> Arn<'a> {
    /// Parses `arn` without copying any of its sections.
    pub fn parse(arn: &'a str) -> Result<Self, ArnError> {
        if !arn.starts_with(ARN_PREFIX) {
            return Err(ArnError::InvalidPrefix);
        }

        // The resource section may itself contain colons.
        let sections: Vec<&str> = arn.splitn(ARN_SECTIONS, ':').collect();
        let [_, partition, service, region, account_id, resource] = sections[..] else {
            return Err(ArnError::InvalidSections);
        };

        if partition.is_empty() {
            return Err(ArnError::MissingPartition);
        }
        if service.is_empty() {
            return Err(ArnError::MissingService);
        }
        if resource.is_empty() {
            return Err(ArnError::MissingResource);
        }

        Ok(Arn {
            partition,
            service,
            region,
            account_id,
            resource,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_role_arn() {
        let arn = Arn::parse("arn:aws:iam:eu-west-1:0123456789012:role/test").unwrap();
        assert_eq!(
            arn,
            Arn {
                partition: "aws",
                service: "iam",
                region: "eu-west-1",
                account_id: "0123456789012",
                resource: "role/test",
            }
        );
    }

    #[test]
    fn parse_keeps_colons_in_resource() {
        let arn =
            Arn::parse("arn:aws-cn:sts::111122223333:assumed-role/node:i-0abc").unwrap();
        assert_eq!(arn.partition, "aws-cn");
        assert_eq!(arn.region, "");
        assert_eq!(arn.account_id, "111122223333");
        assert_eq!(arn.resource, "assumed-role/node:i-0abc");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(Arn::parse(""), Err(ArnError::InvalidPrefix));
        assert_eq!(Arn::parse("urn:aws:iam::1:role/x"), Err(ArnError::InvalidPrefix));
        assert_eq!(Arn::parse("arn:aws:iam::1"), Err(ArnError::InvalidSections));
        assert_eq!(Arn::parse("arn::iam::1:role/x"), Err(ArnError::MissingPartition));
        assert_eq!(Arn::parse("arn:aws:::1:role/x"), Err(ArnError::MissingService));
        assert_eq!(Arn::parse("arn:aws:iam::1:"), Err(ArnError::MissingResource));
    }
}
