//! Events used by the scenarios.

use fedsync_types::{Distribution, Event, EventObject};

/// One `ip-src` attribute inheriting the event's distribution.
pub fn simple_event(info: &str, distribution: Distribution) -> Event {
    let mut event = Event::new(info, distribution);
    event.add_attribute("ip-src", "1.1.1.1");
    event
}

/// All-communities event mixing every community level.
///
/// Top-level attributes, in order: own organisation only, this community
/// only, connected communities, inherited (all communities). The `file`
/// object is connected communities; its `filename` attribute is own
/// organisation only and its `md5` inherits.
pub fn complex_event() -> Event {
    let mut event = Event::new("Complex Event", Distribution::AllCommunities);
    event.add_tag("tlp:white");

    event
        .add_attribute("ip-src", "8.8.8.8")
        .set_distribution(Distribution::YourOrganisationOnly)
        .add_tag("tlp:red");
    event
        .add_attribute("ip-dst", "8.8.8.9")
        .set_distribution(Distribution::ThisCommunityOnly)
        .add_tag("tlp:amber");
    event
        .add_attribute("domain", "google.com")
        .set_distribution(Distribution::ConnectedCommunities)
        .add_tag("tlp:green");
    event.add_attribute("md5", "3c656da41f4645f77e3ec3281b63dd43");

    let mut file = EventObject::new("file");
    file.distribution = Distribution::ConnectedCommunities;
    file.add_attribute("filename", "testfile")
        .set_distribution(Distribution::YourOrganisationOnly);
    file.add_attribute("md5", "3c656da41f4645f77e3ec3281b63dd44");
    event.add_object(file);

    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_event_layout() {
        let event = complex_event();
        let levels: Vec<Distribution> = event.attributes.iter().map(|a| a.distribution).collect();
        assert_eq!(
            levels,
            vec![
                Distribution::YourOrganisationOnly,
                Distribution::ThisCommunityOnly,
                Distribution::ConnectedCommunities,
                Distribution::Inherit,
            ]
        );
        assert_eq!(event.objects.len(), 1);
        assert_eq!(event.object_attribute_count(), 2);
        assert!(event.has_tag("tlp:white"));
    }
}
