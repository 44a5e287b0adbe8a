use serde::Serialize;

/// Counters from one harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    pub sort_active: bool,
    pub growth_cycles: u32,
    pub items_enumerated: u32,
    pub items_accepted: u32,
    pub duplicates: u32,
    pub unwanted_score: u32,
    pub above_threshold: u32,
    pub syndicated: u32,
    pub no_identity: u32,
    pub no_score: u32,
    pub items_failed: u32,
    pub early_stop_pagination: bool,
    pub early_stop_extraction: bool,
}

impl std::fmt::Display for HarvestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Complete ===")?;
        writeln!(f, "Sorted lowest first: {}", self.sort_active)?;
        writeln!(f, "Growth cycles:       {}", self.growth_cycles)?;
        writeln!(f, "Items enumerated:    {}", self.items_enumerated)?;
        writeln!(f, "Records accepted:    {}", self.items_accepted)?;
        writeln!(f, "\nSkipped:")?;
        writeln!(f, "  Duplicates:        {}", self.duplicates)?;
        writeln!(f, "  Unwanted score:    {}", self.unwanted_score)?;
        writeln!(f, "  Above threshold:   {}", self.above_threshold)?;
        writeln!(f, "  Syndicated:        {}", self.syndicated)?;
        writeln!(f, "\nMalformed:")?;
        writeln!(f, "  No identity:       {}", self.no_identity)?;
        writeln!(f, "  No score:          {}", self.no_score)?;
        writeln!(f, "  Failed:            {}", self.items_failed)?;
        if self.early_stop_pagination || self.early_stop_extraction {
            writeln!(f, "\nEarly stop:")?;
            writeln!(f, "  During pagination: {}", self.early_stop_pagination)?;
            writeln!(f, "  During extraction: {}", self.early_stop_extraction)?;
        }
        Ok(())
    }
}
