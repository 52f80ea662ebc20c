use url::Url;

/// Extracts the lowercase host of a URL, including a non-default port
///
/// The port is part of the key because robots.txt is served per origin and the
/// scheduler's per-host spacing must not merge two services on one machine.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_crawler::url::extract_host;
///
/// let url = Url::parse("https://Shop.Example.com/item/1").unwrap();
/// assert_eq!(extract_host(&url), Some("shop.example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/item/1").unwrap();
/// assert_eq!(extract_host(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Builds the robots.txt location for the origin serving `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    url.host_str()?;
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    Some(robots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host_default_port_omitted() {
        let url = Url::parse("https://example.com:443/path").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_host_keeps_custom_port() {
        let url = Url::parse("http://example.com:8080/path").unwrap();
        assert_eq!(extract_host(&url), Some("example.com:8080".to_string()));
    }

    #[test]
    fn test_extract_host_lowercases() {
        let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_host_ip_address() {
        let url = Url::parse("http://192.168.1.1/path").unwrap();
        assert_eq!(extract_host(&url), Some("192.168.1.1".to_string()));
    }

    #[test]
    fn test_robots_url_drops_path_and_query() {
        let url = Url::parse("http://127.0.0.1:9000/catalog/item?id=3#top").unwrap();
        let robots = robots_url(&url).unwrap();
        assert_eq!(robots.as_str(), "http://127.0.0.1:9000/robots.txt");
    }
}
