pub const VALID_AWS_REGIONS: &[&'static str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-north-1",
    "eu-west-3",
    "eu-west-2",
    "eu-west-1",
    "eu-central-1",
    "eu-south-1",
    "ap-south-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-east-1",
    "sa-east-1",
    "me-south-1",
    "af-south-1",
    "us-gov-east-1",
    "us-gov-west-1",
];

/// CloudFront only accepts ACM certificates issued in this region.
pub const CLOUDFRONT_CERT_REGION: &str = "us-east-1";

/// the hosted zone id used by every alias record that targets a cloudfront distribution.
/// see https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-properties-route53-aliastarget.html
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// Route 53 hosted zone ids of the `{region}.elasticbeanstalk.com` domains.
/// Needed to alias a record to an environment CNAME.
const ELASTIC_BEANSTALK_HOSTED_ZONES: &[(&str, &str)] = &[
    ("us-east-1", "Z117KPS5GTRQ2G"),
    ("us-east-2", "Z14LCN19Q5QHIC"),
    ("us-west-1", "Z1LQECGX5PH1X"),
    ("us-west-2", "Z38NKT9BP95V3O"),
    ("ca-central-1", "ZJFCZL7SSZB5I"),
    ("eu-north-1", "Z23GO28BZ5AETM"),
    ("eu-west-3", "Z5WN6GAYWG5OB"),
    ("eu-west-2", "Z1GKAAAUGATPF1"),
    ("eu-west-1", "Z2NYPWQ7DFZAZH"),
    ("eu-central-1", "Z1FRNW7UH4DEZJ"),
    ("eu-south-1", "Z10VDYYOA2JFKM"),
    ("ap-south-1", "Z18NTBI3Y7N9TZ"),
    ("ap-northeast-1", "Z1R25G3KIG2GBW"),
    ("ap-northeast-2", "Z3JE5OI70TWKCP"),
    ("ap-northeast-3", "ZNE5GEY1TIAGY"),
    ("ap-southeast-1", "Z16FZ9L249IFLT"),
    ("ap-southeast-2", "Z2PCDNR3VC2G1N"),
    ("ap-east-1", "ZPWYUBWRU171A"),
    ("sa-east-1", "Z10X7K2B4QSOFV"),
    ("me-south-1", "Z2BBTEKR2I36N2"),
    ("af-south-1", "Z1EI3BVKMKK4AM"),
    ("us-gov-east-1", "Z35TSARG0EJ4VU"),
    ("us-gov-west-1", "Z4KAURWC4UUUG"),
];

pub fn is_valid_region(r: &str) -> bool {
    VALID_AWS_REGIONS.contains(&r)
}

pub fn verify_region(r: &str) -> Result<(), String> {
    if !is_valid_region(r) {
        Err(format!("Invalid region code {:?}\nMust be one of {:?}", r, VALID_AWS_REGIONS))
    } else {
        Ok(())
    }
}

pub fn elastic_beanstalk_hosted_zone(region: &str) -> Option<&'static str> {
    ELASTIC_BEANSTALK_HOSTED_ZONES
        .iter()
        .find(|(r, _)| *r == region)
        .map(|(_, zone)| *zone)
}

/// the public domain an environment gets when created with a CNAME prefix.
pub fn elastic_beanstalk_cname(cname_prefix: &str, region: &str) -> String {
    format!("{cname_prefix}.{region}.elasticbeanstalk.com")
}

/// true if resources for a cloudfront distribution can live in this region
/// without a second, edge-only certificate.
pub fn is_cloudfront_cert_region(region: &str) -> bool {
    region == CLOUDFRONT_CERT_REGION
}
