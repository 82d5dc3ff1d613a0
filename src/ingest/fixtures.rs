/// Test fixtures: representative SOAP payloads from the ANA telemetry service.
///
/// These fixtures are structurally complete but truncated to the minimum
/// needed to exercise the parser. They reflect the real SOAP 1.2 envelope
/// returned by the `DadosHidrometeorologicos` operation of:
///   https://telemetriaws1.ana.gov.br/ServiceANA.asmx
///
/// ANA response shape:
///   Envelope.Body.DadosHidrometeorologicosResponse
///     .DadosHidrometeorologicosResult.diffgram
///       .DocumentElement
///         .DadosHidrometereologicos[]   - one per reading (note the spelling)
///           .CodEstacao - station code
///           .DataHora   - "YYYY-MM-DD HH:MM:SS", often space padded
///           .Vazao      - discharge, usually empty, ignored
///           .Nivel      - level as a STRING, may be empty
///           .Chuva      - rainfall as a STRING, may be empty
///
/// Note: the service ships an inline XML schema before the diffgram and
/// leaves `Vazao` empty for most stations. Parsers must skip both.

/// Muçum (86510000): three readings on 2023-09-04 and two on 2023-09-05.
/// Daily max level is 2580 then 1910; rainfall sums to 36.4 then 2.0.
#[cfg(test)]
pub(crate) fn fixture_mucum_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <soap:Body>
    <DadosHidrometeorologicosResponse xmlns="http://MRCS/">
      <DadosHidrometeorologicosResult>
        <xs:schema id="NewDataSet" xmlns="" xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:msdata="urn:schemas-microsoft-com:xml-msdata">
          <xs:element name="NewDataSet" msdata:IsDataSet="true" />
        </xs:schema>
        <diffgr:diffgram xmlns:msdata="urn:schemas-microsoft-com:xml-msdata" xmlns:diffgr="urn:schemas-microsoft-com:xml-diffgram-v1">
          <DocumentElement xmlns="">
            <DadosHidrometereologicos diffgr:id="DadosHidrometereologicos1" msdata:rowOrder="0">
              <CodEstacao>86510000</CodEstacao>
              <DataHora>2023-09-05 12:00:00   </DataHora>
              <Vazao />
              <Nivel>1910.00</Nivel>
              <Chuva>0.00</Chuva>
            </DadosHidrometereologicos>
            <DadosHidrometereologicos diffgr:id="DadosHidrometereologicos2" msdata:rowOrder="1">
              <CodEstacao>86510000</CodEstacao>
              <DataHora>2023-09-05 00:00:00   </DataHora>
              <Vazao />
              <Nivel>1875.50</Nivel>
              <Chuva>2.00</Chuva>
            </DadosHidrometereologicos>
            <DadosHidrometereologicos diffgr:id="DadosHidrometereologicos3" msdata:rowOrder="2">
              <CodEstacao>86510000</CodEstacao>
              <DataHora>2023-09-04 23:00:00   </DataHora>
              <Vazao />
              <Nivel>2580.00</Nivel>
              <Chuva>12.40</Chuva>
            </DadosHidrometereologicos>
            <DadosHidrometereologicos diffgr:id="DadosHidrometereologicos4" msdata:rowOrder="3">
              <CodEstacao>86510000</CodEstacao>
              <DataHora>2023-09-04 12:00:00   </DataHora>
              <Vazao />
              <Nivel>1420.00</Nivel>
              <Chuva>20.00</Chuva>
            </DadosHidrometereologicos>
            <DadosHidrometereologicos diffgr:id="DadosHidrometereologicos5" msdata:rowOrder="4">
              <CodEstacao>86510000</CodEstacao>
              <DataHora>2023-09-04 00:00:00   </DataHora>
              <Vazao />
              <Nivel>610.00</Nivel>
              <Chuva>4.00</Chuva>
            </DadosHidrometereologicos>
          </DocumentElement>
        </diffgr:diffgram>
      </DadosHidrometeorologicosResult>
    </DadosHidrometeorologicosResponse>
  </soap:Body>
</soap:Envelope>"#
}

/// A valid envelope whose diffgram is empty - what the service returns for
/// a date range with no telemetry. Parser should return zero readings.
#[cfg(test)]
pub(crate) fn fixture_no_records_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <DadosHidrometeorologicosResponse xmlns="http://MRCS/">
      <DadosHidrometeorologicosResult>
        <diffgr:diffgram xmlns:diffgr="urn:schemas-microsoft-com:xml-diffgram-v1" />
      </DadosHidrometeorologicosResult>
    </DadosHidrometeorologicosResponse>
  </soap:Body>
</soap:Envelope>"#
}

/// Two readings, the first with an empty `Nivel` (sensor outage).
#[cfg(test)]
pub(crate) fn fixture_blank_level_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <DadosHidrometeorologicosResponse xmlns="http://MRCS/">
      <DadosHidrometeorologicosResult>
        <DocumentElement xmlns="">
          <DadosHidrometereologicos>
            <CodEstacao>86510000</CodEstacao>
            <DataHora>2023-09-04 00:15:00</DataHora>
            <Nivel />
            <Chuva>0.20</Chuva>
          </DadosHidrometereologicos>
          <DadosHidrometereologicos>
            <CodEstacao>86510000</CodEstacao>
            <DataHora>2023-09-04 00:30:00</DataHora>
            <Nivel>615.00</Nivel>
            <Chuva>0.40</Chuva>
          </DadosHidrometereologicos>
        </DocumentElement>
      </DadosHidrometeorologicosResult>
    </DadosHidrometeorologicosResponse>
  </soap:Body>
</soap:Envelope>"#
}

/// A reading that lacks its `Chuva` element entirely.
#[cfg(test)]
pub(crate) fn fixture_missing_rainfall_element_xml() -> &'static str {
    r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <DocumentElement>
      <DadosHidrometereologicos>
        <CodEstacao>86510000</CodEstacao>
        <DataHora>2023-09-04 00:15:00</DataHora>
        <Nivel>610.00</Nivel>
      </DadosHidrometereologicos>
    </DocumentElement>
  </soap:Body>
</soap:Envelope>"#
}

/// SOAP 1.2 fault, as returned for an unknown operation or bad arguments.
#[cfg(test)]
pub(crate) fn fixture_soap_fault_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <soap:Fault>
      <soap:Code><soap:Value>soap:Receiver</soap:Value></soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">Server was unable to process request. String was not recognized as a valid DateTime.</soap:Text>
      </soap:Reason>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#
}
