/// The six NEU-SDD surface defect classes offered as quick-select queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Crazing,
    Inclusion,
    Patches,
    PittedSurface,
    RolledInScale,
    Scratches,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Crazing,
        Topic::Inclusion,
        Topic::Patches,
        Topic::PittedSurface,
        Topic::RolledInScale,
        Topic::Scratches,
    ];

    /// Dataset identifier, exactly as it is spelled in prompts.
    pub fn id(self) -> &'static str {
        match self {
            Topic::Crazing => "crazing",
            Topic::Inclusion => "inclusion",
            Topic::Patches => "patches",
            Topic::PittedSurface => "pitted_surface",
            Topic::RolledInScale => "rolled-in_scale",
            Topic::Scratches => "scratches",
        }
    }

    /// Button label: upper-cased, underscores shown as spaces.
    pub fn label(self) -> String {
        self.id().to_uppercase().replace('_', " ")
    }
}
